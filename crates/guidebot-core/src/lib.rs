//! # GuideBot Core
//!
//! Runtime-agnostic retrieval logic for GuideBot: report models, corpus
//! record parsing, the in-memory corpus store, cosine ranking, the
//! [`Embedder`](embedding::Embedder) trait, and retry policy.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Concrete
//! embedders, the corpus loader, and the single-flight index live in the
//! `guidebot` application crate.

pub mod corpus;
pub mod embedding;
pub mod error;
pub mod models;
pub mod retry;
pub mod search;
pub mod source;
pub mod store;

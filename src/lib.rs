//! # GuideBot Retrieval
//!
//! Retrieval subsystem of GuideBot, a chatbot that answers questions about
//! radiology reports. Given a free-text query it returns the most similar
//! reports from a corpus of de-identified reports, so the chat layer can
//! ground its answers in real report language.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │ JSONL file  │──▶│  Corpus loader   │──▶│ CorpusStore │
//! │  (source)   │   │ parse+batch+embed│   │ (in memory) │
//! └─────────────┘   └────────┬─────────┘   └──────┬──────┘
//!                            │                    │ snapshot
//!                     ┌──────▼──────┐       ┌─────▼─────┐
//!                     │  Embedder   │◀──────│  rank()   │
//!                     │ HF/OpenAI/… │ query │  cosine   │
//!                     └─────────────┘       └─────┬─────┘
//!                                    ┌────────────┤
//!                                    ▼            ▼
//!                               ┌────────┐   ┌────────┐
//!                               │  CLI   │   │  HTTP  │
//!                               └────────┘   └────────┘
//! ```
//!
//! The corpus is loaded once, lazily, on first use; every later query
//! embeds only the query text and ranks the in-memory reports by cosine
//! similarity.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider implementations |
//! | [`source`] | JSONL corpus file source |
//! | [`loader`] | Corpus loading: parse, batch, embed, retry |
//! | [`index`] | Single-flight loading and retrieval |
//! | [`search`] | `guidebot search` command |
//! | [`inspect`] | `guidebot inspect` command |
//! | [`stats`] | `guidebot stats` command |
//! | [`server`] | HTTP retrieval server |
//! | [`progress`] | Load progress reporting |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod embedding;
pub mod index;
pub mod inspect;
pub mod loader;
pub mod logging;
pub mod progress;
pub mod search;
pub mod server;
pub mod source;
pub mod stats;

#[cfg(test)]
mod testing;

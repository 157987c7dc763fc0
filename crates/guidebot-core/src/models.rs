//! Core data models for the report corpus.
//!
//! These types flow from the corpus loader into the [`CorpusStore`](crate::store::CorpusStore)
//! and out of the ranking engine as [`ScoredReport`]s.

use serde::Serialize;

/// One corpus entry.
///
/// An empty `embedding` means embedding generation failed for this report.
/// Such reports stay in the store for diagnostics but are never ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Identifier, unique within the corpus.
    pub id: String,
    /// Trimmed, non-empty report body.
    pub text: String,
    /// Embedding vector; empty when generation failed.
    pub embedding: Vec<f32>,
}

impl Report {
    /// Whether this report can take part in ranking.
    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A report ranked against a query.
///
/// This is a copy of the stored report; callers never hold references
/// into the store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredReport {
    pub id: String,
    pub text: String,
    /// Leading excerpt of `text` for "used reports" references.
    pub snippet: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Lifecycle of the corpus store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
        };
        f.write_str(s)
    }
}

/// Counters produced by one load sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Lines read from the corpus source (blank lines included).
    pub lines: usize,
    /// Non-blank lines that did not produce a report.
    pub skipped: usize,
    /// Reports with a usable embedding.
    pub embedded: usize,
    /// Reports whose embedding failed.
    pub failed: usize,
    /// Wall-clock duration of the load.
    pub duration_ms: u64,
}

/// Diagnostics snapshot for health and debug surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub state: LoadState,
    /// Number of reports held in the store (embedded or not).
    pub reports: usize,
    pub embedded: usize,
    pub failed: usize,
    pub lines: usize,
    pub skipped: usize,
    /// Embedding dimensionality, once established.
    pub dims: Option<usize>,
    pub model: Option<String>,
    /// ISO 8601 timestamp of the successful load.
    pub loaded_at: Option<String>,
    pub load_duration_ms: Option<u64>,
    /// Message of the most recent failed load, if any.
    pub last_error: Option<String>,
}

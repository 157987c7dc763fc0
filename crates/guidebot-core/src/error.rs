//! Typed errors for embedding, corpus parsing, and retrieval.

use std::time::Duration;

/// Failure of a single embedding call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbedError {
    /// The backend cannot be reached or initialized (credentials, network,
    /// model loading). Fatal to a corpus load.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The backend asked us to slow down.
    #[error("embedding provider rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    /// The request failed for these inputs (bad response, server error,
    /// rejected input).
    #[error("embedding failed: {0}")]
    Failed(String),
}

impl EmbedError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmbedError::RateLimited { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EmbedError::ProviderUnavailable(_))
    }
}

/// Why a corpus line did not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Parse(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("no usable report text")]
    MissingText,

    #[error("identifier field is empty or not a string/integer")]
    MissingId,

    #[error("identifier '{0}' uses the reserved 'line:' prefix")]
    ReservedId(String),

    #[error("duplicate report id '{0}'")]
    DuplicateId(String),
}

/// Errors surfaced by loading and retrieval.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    #[error("query must not be empty")]
    InvalidQuery,

    #[error("report corpus is not loaded")]
    NotLoaded,

    #[error("report corpus has no embedded reports")]
    EmptyIndex,

    #[error("no embeddings were generated for {records} corpus records")]
    NoEmbeddingsGenerated { records: usize },

    /// Query and report vectors disagree in length. This is an internal
    /// invariant violation, not a user error.
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corpus source unavailable: {0}")]
    CorpusUnavailable(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

impl RetrievalError {
    /// Machine-readable error code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::InvalidQuery => "invalid_query",
            RetrievalError::NotLoaded => "not_loaded",
            RetrievalError::EmptyIndex => "empty_index",
            RetrievalError::NoEmbeddingsGenerated { .. } => "no_embeddings",
            RetrievalError::DimensionMismatch { .. } => "internal",
            RetrievalError::CorpusUnavailable(_) => "corpus_unavailable",
            RetrievalError::Embedding(e) => match e {
                EmbedError::ProviderUnavailable(_) => "provider_unavailable",
                EmbedError::RateLimited { .. } => "rate_limited",
                EmbedError::Timeout(_) => "timeout",
                EmbedError::Failed(_) => "embedding_failed",
            },
        }
    }
}

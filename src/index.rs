//! Report index: lazy corpus loading plus query-time retrieval.
//!
//! [`ReportIndex`] is the entry point the CLI and the HTTP server share.
//! It owns the [`CorpusStore`], the loader, and the embedder, and
//! guarantees that at most one load sequence runs at a time:
//!
//! ```text
//! ensure_loaded ──▶ loaded? ──yes──▶ return
//!                      │ no
//!                      ▼
//!               acquire load gate ──▶ loaded now? ──yes──▶ return
//!                      │ no                     (another caller won)
//!                      ▼
//!               Unloaded → Loading → load() → publish → Loaded
//!                                       └── error ──▶ Unloaded (+ last_error)
//! ```
//!
//! Callers that waited behind a failed load receive that load's error
//! instead of starting another attempt; the next call after that retries.
//!
//! [`ReportIndex::retrieve`] never triggers a load. It requires the store to
//! be loaded and ranks against an immutable snapshot, so any number of
//! retrievals run concurrently.

use anyhow::Result;
use guidebot_core::corpus::embedding_input;
use guidebot_core::embedding::{is_finite_vector, Embedder};
use guidebot_core::error::{EmbedError, RetrievalError};
use guidebot_core::models::{CorpusStats, LoadState, ScoredReport};
use guidebot_core::search::rank;
use guidebot_core::store::CorpusStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::loader::{embed_with_timeout, CorpusLoader, LoaderOptions};
use crate::progress::{LoadProgressReporter, NoProgress};
use crate::source::JsonlFileSource;

/// Query-side settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Timeout for the query embedding call.
    pub timeout: Duration,
    /// Characters of query text sent to the embedder (0 = all).
    pub max_embed_chars: usize,
    pub snippet_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_embed_chars: 2000,
            snippet_chars: guidebot_core::search::DEFAULT_SNIPPET_CHARS,
        }
    }
}

/// Lazily loaded, shareable report index.
pub struct ReportIndex {
    store: CorpusStore,
    loader: CorpusLoader,
    embedder: Arc<dyn Embedder>,
    query: QueryOptions,
    load_gate: tokio::sync::Mutex<()>,
    /// Completed load attempts, successful or not.
    attempts: AtomicU64,
    last_failure: Mutex<Option<RetrievalError>>,
}

impl ReportIndex {
    pub fn new(loader: CorpusLoader, embedder: Arc<dyn Embedder>, query: QueryOptions) -> Self {
        Self {
            store: CorpusStore::new(),
            loader,
            embedder,
            query,
            load_gate: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// Wire up the JSONL source and the configured embedder.
    pub fn from_config(config: &Config, progress: Arc<dyn LoadProgressReporter>) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let source = Arc::new(JsonlFileSource::new(&config.corpus.path));
        let loader = CorpusLoader::new(source, Arc::clone(&embedder), LoaderOptions::from_config(config))
            .with_progress(progress);
        let query = QueryOptions {
            timeout: config.embedding.timeout(),
            max_embed_chars: config.corpus.max_embed_chars,
            snippet_chars: config.retrieval.snippet_chars,
        };
        Ok(Self::new(loader, embedder, query))
    }

    /// Like [`from_config`](Self::from_config) without progress output.
    pub fn from_config_quiet(config: &Config) -> Result<Self> {
        Self::from_config(config, Arc::new(NoProgress))
    }

    pub fn state(&self) -> LoadState {
        self.store.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }

    pub fn stats(&self) -> CorpusStats {
        self.store.stats()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Load the corpus if it is not loaded yet.
    ///
    /// Safe to call from many tasks at once: exactly one of them runs the
    /// load, the rest wait for it. A no-op once loaded.
    pub async fn ensure_loaded(&self) -> Result<(), RetrievalError> {
        if self.store.is_loaded() {
            return Ok(());
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let _gate = self.load_gate.lock().await;

        if self.store.is_loaded() {
            return Ok(());
        }
        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(e) = self.last_failure().clone() {
                return Err(e);
            }
        }
        if !self.store.begin_loading() {
            // Only reachable if the store was loaded between the checks.
            return if self.store.is_loaded() {
                Ok(())
            } else {
                Err(RetrievalError::NotLoaded)
            };
        }

        let guard = LoadingGuard {
            store: &self.store,
            armed: true,
        };
        info!(model = %self.embedder.model_name(), "loading report corpus");

        let result = match self.loader.load().await {
            Ok(loaded) => self.store.publish(
                loaded.reports,
                loaded.dims,
                self.embedder.model_name(),
                loaded.report,
            ),
            Err(e) => {
                self.store.fail(&e.to_string());
                Err(e)
            }
        };
        guard.disarm();

        *self.last_failure() = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match &result {
            Ok(()) => {
                let stats = self.store.stats();
                info!(
                    reports = stats.reports,
                    embedded = stats.embedded,
                    failed = stats.failed,
                    dims = stats.dims.unwrap_or_default(),
                    "report corpus loaded"
                );
            }
            Err(e) => error!(error = %e, code = e.code(), "report corpus load failed"),
        }
        result
    }

    /// Top-`k` reports for `query`, best first.
    ///
    /// Does not load the corpus; call [`ensure_loaded`](Self::ensure_loaded)
    /// first.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidQuery`] for a blank query (the embedder is
    ///   not called).
    /// - [`RetrievalError::NotLoaded`] if the corpus is not loaded.
    /// - [`RetrievalError::Embedding`] if the query embedding fails or is
    ///   empty or non-finite.
    pub async fn retrieve(&self, query: &str, k: i64) -> Result<Vec<ScoredReport>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery);
        }
        let reports = self.store.snapshot()?;
        if k <= 0 {
            return Ok(Vec::new());
        }

        let input = embedding_input(query, self.query.max_embed_chars);
        let mut vectors =
            embed_with_timeout(self.embedder.as_ref(), &[input], self.query.timeout).await?;
        let query_vec = vectors.pop().unwrap_or_default();
        if query_vec.is_empty() || !is_finite_vector(&query_vec) {
            return Err(EmbedError::Failed("query embedding is empty or non-finite".to_string()).into());
        }

        rank(&reports, &query_vec, k, self.query.snippet_chars)
    }

    fn last_failure(&self) -> std::sync::MutexGuard<'_, Option<RetrievalError>> {
        self.last_failure.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the store to `Unloaded` if a load is dropped mid-flight
/// (e.g. the HTTP request that triggered it was cancelled).
struct LoadingGuard<'a> {
    store: &'a CorpusStore,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.fail("load cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corpus_line, fast_options, FakeEmbedder};
    use guidebot_core::error::EmbedError;
    use guidebot_core::source::StaticSource;

    fn index_with(lines: Vec<String>, embedder: FakeEmbedder) -> (Arc<ReportIndex>, Arc<FakeEmbedder>) {
        let embedder = Arc::new(embedder);
        let loader = CorpusLoader::new(
            Arc::new(StaticSource::new(lines)),
            embedder.clone(),
            fast_options(),
        );
        let index = ReportIndex::new(loader, embedder.clone(), QueryOptions::default());
        (Arc::new(index), embedder)
    }

    fn three_reports() -> Vec<String> {
        vec![
            corpus_line("a", "left lower lobe consolidation"),
            corpus_line("b", "no acute intracranial abnormality"),
            corpus_line("c", "small right pleural effusion"),
        ]
    }

    fn three_vectors() -> FakeEmbedder {
        FakeEmbedder::new()
            .with("left lower lobe consolidation", vec![1.0, 0.0])
            .with("no acute intracranial abnormality", vec![0.0, 1.0])
            .with("small right pleural effusion", vec![0.6, 0.8])
    }

    #[tokio::test]
    async fn retrieve_ranks_by_similarity() {
        let (index, _) = index_with(three_reports(), three_vectors().with("pneumonia", vec![0.8, 0.6]));
        index.ensure_loaded().await.unwrap();

        let results = index.retrieve("pneumonia", 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!((results[0].score - 0.96).abs() < 1e-5);
        assert!((results[1].score - 0.8).abs() < 1e-5);
        assert_eq!(results[1].text, "left lower lobe consolidation");
    }

    #[tokio::test]
    async fn repeated_queries_are_deterministic() {
        let (index, _) = index_with(three_reports(), three_vectors().with("pneumonia", vec![0.8, 0.6]));
        index.ensure_loaded().await.unwrap();

        let first = index.retrieve("pneumonia", 3).await.unwrap();
        for _ in 0..5 {
            assert_eq!(index.retrieve("pneumonia", 3).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn retrieve_before_load_is_not_loaded() {
        let (index, embedder) = index_with(three_reports(), three_vectors());
        assert_eq!(
            index.retrieve("anything", 3).await.unwrap_err(),
            RetrievalError::NotLoaded
        );
        assert_eq!(embedder.calls(), 0);
        assert_eq!(index.state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn blank_query_never_reaches_embedder() {
        let (index, embedder) = index_with(three_reports(), three_vectors());
        index.ensure_loaded().await.unwrap();
        let calls = embedder.calls();

        for query in ["", "   ", "\t\n"] {
            assert_eq!(
                index.retrieve(query, 3).await.unwrap_err(),
                RetrievalError::InvalidQuery
            );
        }
        assert_eq!(embedder.calls(), calls);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_load() {
        let (index, embedder) = index_with(three_reports(), three_vectors());
        assert_eq!(
            index.retrieve("", 3).await.unwrap_err(),
            RetrievalError::InvalidQuery
        );
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn non_positive_k_returns_nothing() {
        let (index, _) = index_with(three_reports(), three_vectors());
        index.ensure_loaded().await.unwrap();
        assert!(index.retrieve("pneumonia", 0).await.unwrap().is_empty());
        assert!(index.retrieve("pneumonia", -2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn k_larger_than_corpus_returns_all_embedded() {
        let (index, _) = index_with(
            three_reports(),
            three_vectors()
                .failing("small right pleural effusion")
                .with("pneumonia", vec![1.0, 1.0]),
        );
        index.ensure_loaded().await.unwrap();
        let results = index.retrieve("pneumonia", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.id != "c"));
        assert_eq!(index.stats().failed, 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let (index, embedder) = index_with(
            three_reports(),
            three_vectors().with_delay(Duration::from_millis(20)),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = Arc::clone(&index);
            handles.push(tokio::spawn(async move { index.ensure_loaded().await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(index.is_loaded());
        // Three records fit in one default batch: one embedder call total.
        assert_eq!(embedder.calls(), 1);
        assert_eq!(index.stats().reports, 3);
    }

    #[tokio::test]
    async fn failed_load_reverts_and_can_retry() {
        let (index, _) = index_with(three_reports(), FakeEmbedder::new().unavailable());
        let err = index.ensure_loaded().await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Embedding(EmbedError::ProviderUnavailable(_))
        ));
        assert_eq!(index.state(), LoadState::Unloaded);
        assert!(index.stats().last_error.is_some());

        // A later call starts a fresh attempt.
        assert!(index.ensure_loaded().await.is_err());
    }

    #[tokio::test]
    async fn no_embeddings_is_reported() {
        let (index, _) = index_with(three_reports(), FakeEmbedder::new());
        assert_eq!(
            index.ensure_loaded().await.unwrap_err(),
            RetrievalError::NoEmbeddingsGenerated { records: 3 }
        );
        assert!(!index.is_loaded());
    }

    #[tokio::test]
    async fn query_embedding_failure_propagates() {
        let (index, _) = index_with(three_reports(), three_vectors());
        index.ensure_loaded().await.unwrap();
        assert!(matches!(
            index.retrieve("unknown query", 3).await,
            Err(RetrievalError::Embedding(EmbedError::Failed(_)))
        ));
        // The store is unaffected.
        assert!(index.is_loaded());
    }

    #[tokio::test]
    async fn non_finite_query_embedding_is_rejected() {
        let (index, _) = index_with(
            three_reports(),
            three_vectors()
                .with("nan query", vec![f32::NAN, 0.0])
                .with("inf query", vec![f32::INFINITY, 1.0]),
        );
        index.ensure_loaded().await.unwrap();

        for query in ["nan query", "inf query"] {
            assert!(matches!(
                index.retrieve(query, 3).await,
                Err(RetrievalError::Embedding(EmbedError::Failed(_)))
            ));
        }
        assert!(index.is_loaded());
    }

    #[tokio::test]
    async fn cancelled_load_returns_to_unloaded() {
        let (index, _) = index_with(
            three_reports(),
            three_vectors().with_delay(Duration::from_millis(200)),
        );
        let pending = tokio::time::timeout(Duration::from_millis(20), index.ensure_loaded()).await;
        assert!(pending.is_err());
        assert_eq!(index.state(), LoadState::Unloaded);
        assert_eq!(index.stats().last_error.as_deref(), Some("load cancelled"));
    }
}

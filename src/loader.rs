//! Corpus loader: source → parse → embed → reports.
//!
//! Reads every line of the corpus source, parses and validates records
//! (bad lines are logged and skipped), then embeds the surviving records in
//! batches. Embedding is the failure-prone step, so the loader:
//!
//! - wraps every embedder call in a request timeout;
//! - backs off and retries the same batch when the embedder reports
//!   [`EmbedError::RateLimited`], following the configured [`RetryPolicy`];
//! - retries a failed multi-record batch one record at a time so a single
//!   bad record does not take its neighbours down with it;
//! - keeps records whose embedding failed, with an empty vector;
//! - aborts on [`EmbedError::ProviderUnavailable`] (the backend is gone,
//!   every further call would fail the same way).
//!
//! Up to `concurrency` batches run at once; each wave of batches is
//! followed by `batch_delay` to stay under provider-side throttling.
//! Results are placed by record position, so the loaded corpus does not
//! depend on completion order.

use guidebot_core::corpus::{embedding_input, parse_corpus, RecordFields};
use guidebot_core::embedding::{is_finite_vector, Embedder};
use guidebot_core::error::{EmbedError, RetrievalError};
use guidebot_core::models::{LoadReport, Report};
use guidebot_core::retry::RetryPolicy;
use guidebot_core::source::CorpusSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::progress::{LoadProgressEvent, LoadProgressReporter, NoProgress};

/// Loader tuning, decoupled from the TOML config.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub fields: RecordFields,
    pub max_reports: Option<usize>,
    /// Characters of report text sent to the embedder (0 = all).
    pub max_embed_chars: usize,
    pub batch_size: usize,
    /// Pause between waves of batches.
    pub batch_delay: Duration,
    /// Batches in flight at once.
    pub concurrency: usize,
    /// Per-call embedding timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            fields: RecordFields::default(),
            max_reports: None,
            max_embed_chars: 2000,
            batch_size: 8,
            batch_delay: Duration::from_millis(500),
            concurrency: 1,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl LoaderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fields: config.corpus.record_fields(),
            max_reports: config.corpus.max_reports,
            max_embed_chars: config.corpus.max_embed_chars,
            batch_size: config.embedding.batch_size,
            batch_delay: config.embedding.batch_delay(),
            concurrency: config.embedding.concurrency,
            timeout: config.embedding.timeout(),
            retry: config.embedding.retry.policy(),
        }
    }
}

/// Output of a successful load, ready to publish into the store.
#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    pub reports: Vec<Report>,
    pub dims: usize,
    pub report: LoadReport,
}

/// One-shot corpus loader.
pub struct CorpusLoader {
    source: Arc<dyn CorpusSource>,
    embedder: Arc<dyn Embedder>,
    options: LoaderOptions,
    progress: Arc<dyn LoadProgressReporter>,
}

impl CorpusLoader {
    pub fn new(
        source: Arc<dyn CorpusSource>,
        embedder: Arc<dyn Embedder>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            source,
            embedder,
            options,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn LoadProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Read, parse, and embed the whole corpus.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::CorpusUnavailable`] if the source cannot be read.
    /// - [`RetrievalError::Embedding`] with `ProviderUnavailable` if the
    ///   embedder is unreachable, or if its declared dimension disagrees
    ///   with the vectors it actually returns.
    /// - [`RetrievalError::NoEmbeddingsGenerated`] if not a single record
    ///   could be embedded.
    pub async fn load(&self) -> Result<LoadedCorpus, RetrievalError> {
        let started = Instant::now();
        let source_name = self.source.describe();
        self.progress.report(LoadProgressEvent::Reading {
            source: source_name.clone(),
        });

        let lines = self
            .source
            .read_lines()
            .await
            .map_err(|e| RetrievalError::CorpusUnavailable(format!("{:#}", e)))?;

        let parsed = parse_corpus(&lines, &self.options.fields, self.options.max_reports);
        for skipped in &parsed.skipped {
            warn!(line = skipped.line + 1, reason = %skipped.reason, "skipping corpus line");
        }
        info!(
            source = %source_name,
            lines = parsed.lines,
            records = parsed.records.len(),
            skipped = parsed.skipped.len(),
            "corpus parsed"
        );

        let inputs: Vec<String> = parsed
            .records
            .iter()
            .map(|r| embedding_input(&r.text, self.options.max_embed_chars))
            .collect();
        let vectors = self.embed_all(inputs).await?;

        let observed = vectors
            .iter()
            .flatten()
            .find(|v| !v.is_empty() && is_finite_vector(v))
            .map(Vec::len);
        let declared = self.embedder.dims().filter(|d| *d > 0);
        if let (Some(declared), Some(observed)) = (declared, observed) {
            if declared != observed {
                return Err(EmbedError::ProviderUnavailable(format!(
                    "configured embedding.dims is {} but {} returned {}-dimensional vectors",
                    declared,
                    self.embedder.model_name(),
                    observed
                ))
                .into());
            }
        }

        let mut dims = declared.or(observed);
        let mut reports = Vec::with_capacity(parsed.records.len());
        let mut embedded = 0usize;

        for (record, vector) in parsed.records.into_iter().zip(vectors) {
            let embedding = match vector {
                Some(v) if !v.is_empty() && is_finite_vector(&v) => {
                    let expected = *dims.get_or_insert(v.len());
                    if v.len() == expected {
                        v
                    } else {
                        warn!(
                            id = %record.id,
                            expected,
                            actual = v.len(),
                            "embedding has wrong dimension; report excluded from retrieval"
                        );
                        Vec::new()
                    }
                }
                Some(_) => {
                    warn!(id = %record.id, "embedding is empty or non-finite; report excluded from retrieval");
                    Vec::new()
                }
                None => {
                    warn!(id = %record.id, "embedding failed; report excluded from retrieval");
                    Vec::new()
                }
            };
            if !embedding.is_empty() {
                embedded += 1;
            }
            reports.push(Report {
                id: record.id,
                text: record.text,
                embedding,
            });
        }

        let failed = reports.len() - embedded;
        self.progress.report(LoadProgressEvent::Done {
            embedded: embedded as u64,
            failed: failed as u64,
        });

        if embedded == 0 {
            return Err(RetrievalError::NoEmbeddingsGenerated {
                records: reports.len(),
            });
        }

        let report = LoadReport {
            lines: parsed.lines,
            skipped: parsed.skipped.len(),
            embedded,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            reports = reports.len(),
            embedded,
            failed,
            duration_ms = report.duration_ms,
            "corpus embedded"
        );

        Ok(LoadedCorpus {
            reports,
            // embedded > 0 guarantees dims was established.
            dims: dims.unwrap_or_default(),
            report,
        })
    }

    /// Embed `inputs` in batches; `None` marks a failed record.
    async fn embed_all(&self, inputs: Vec<String>) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
        let total = inputs.len();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; total];
        let batch_size = self.options.batch_size.max(1);
        let concurrency = self.options.concurrency.max(1);

        let batches: Vec<(usize, Vec<String>)> = inputs
            .chunks(batch_size)
            .enumerate()
            .map(|(i, chunk)| (i * batch_size, chunk.to_vec()))
            .collect();

        let mut done = 0usize;
        let mut waves = batches.chunks(concurrency).peekable();
        while let Some(wave) = waves.next() {
            let mut tasks = JoinSet::new();
            for (offset, texts) in wave.iter().cloned() {
                let embedder = Arc::clone(&self.embedder);
                let policy = self.options.retry.clone();
                let timeout = self.options.timeout;
                tasks.spawn(async move {
                    let count = texts.len();
                    let vectors = embed_batch_isolating(embedder.as_ref(), texts, &policy, timeout).await;
                    (offset, count, vectors)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (offset, count, vectors) = joined
                    .map_err(|e| EmbedError::Failed(format!("embedding task panicked: {}", e)))?;
                let vectors = vectors?;
                for (i, v) in vectors.into_iter().enumerate() {
                    results[offset + i] = v;
                }
                done += count;
            }

            debug!(done, total, "embedding wave complete");
            self.progress.report(LoadProgressEvent::Embedding {
                n: done as u64,
                total: total as u64,
            });

            if waves.peek().is_some() && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
        }

        Ok(results)
    }
}

/// Embed one batch; a non-fatal batch failure falls back to per-record
/// calls. Only `ProviderUnavailable` escapes as an error.
async fn embed_batch_isolating(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
    match embed_with_retry(embedder, &texts, policy, timeout).await {
        Ok(vectors) => Ok(vectors.into_iter().map(Some).collect()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) if texts.len() > 1 && !e.is_rate_limited() => {
            debug!(error = %e, size = texts.len(), "batch failed; embedding records one by one");
            let mut out = Vec::with_capacity(texts.len());
            for text in &texts {
                match embed_with_retry(embedder, std::slice::from_ref(text), policy, timeout).await
                {
                    Ok(mut v) => out.push(v.pop()),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "embedding failed for record");
                        out.push(None);
                    }
                }
            }
            Ok(out)
        }
        Err(e) => {
            warn!(error = %e, size = texts.len(), "embedding failed for batch");
            Ok(vec![None; texts.len()])
        }
    }
}

/// Call the embedder with a timeout, backing off on rate limits.
///
/// Guarantees one vector per input on success.
async fn embed_with_retry(
    embedder: &dyn Embedder,
    texts: &[String],
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut attempt = 1u32;
    loop {
        match embed_with_timeout(embedder, texts, timeout).await {
            Err(EmbedError::RateLimited { retry_after }) if policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt, retry_after);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "embedding provider rate limited; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// One embedder call bounded by `timeout`.
pub(crate) async fn embed_with_timeout(
    embedder: &dyn Embedder,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let vectors = tokio::time::timeout(timeout, embedder.embed_batch(texts))
        .await
        .map_err(|_| EmbedError::Timeout(timeout))??;
    if vectors.len() != texts.len() {
        return Err(EmbedError::Failed(format!(
            "expected {} embeddings, got {}",
            texts.len(),
            vectors.len()
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corpus_line, fast_options, FakeEmbedder};
    use guidebot_core::source::StaticSource;

    fn loader(lines: Vec<String>, embedder: Arc<FakeEmbedder>, options: LoaderOptions) -> CorpusLoader {
        CorpusLoader::new(Arc::new(StaticSource::new(lines)), embedder, options)
    }

    fn five_reports() -> (Vec<String>, FakeEmbedder) {
        let lines = (1..=5)
            .map(|i| corpus_line(&format!("r{}", i), &format!("report {}", i)))
            .collect();
        let embedder = FakeEmbedder::new()
            .with("report 1", vec![1.0, 0.0])
            .with("report 2", vec![0.0, 1.0])
            .with("report 3", vec![0.9, 0.1])
            .with("report 4", vec![-1.0, 0.0])
            .with("report 5", vec![0.5, 0.5]);
        (lines, embedder)
    }

    #[tokio::test]
    async fn loads_all_records() {
        let (lines, embedder) = five_reports();
        let loaded = loader(lines, Arc::new(embedder), fast_options())
            .load()
            .await
            .unwrap();
        assert_eq!(loaded.reports.len(), 5);
        assert_eq!(loaded.dims, 2);
        assert_eq!(loaded.report.embedded, 5);
        assert_eq!(loaded.report.failed, 0);
        assert_eq!(loaded.reports[2].id, "r3");
    }

    #[tokio::test]
    async fn failed_record_keeps_empty_embedding() {
        let (lines, embedder) = five_reports();
        let embedder = Arc::new(embedder.failing("report 3"));
        let mut options = fast_options();
        options.batch_size = 5;

        let loaded = loader(lines, embedder, options).load().await.unwrap();
        assert_eq!(loaded.report.embedded, 4);
        assert_eq!(loaded.report.failed, 1);
        assert!(loaded.reports[2].embedding.is_empty());
        assert!(loaded
            .reports
            .iter()
            .enumerate()
            .all(|(i, r)| i == 2 || !r.embedding.is_empty()));
    }

    #[tokio::test]
    async fn skips_invalid_lines() {
        let lines = vec![
            corpus_line("a", "alpha"),
            "{broken".to_string(),
            r#"{"id": "b"}"#.to_string(),
            String::new(),
            corpus_line("c", "gamma"),
        ];
        let embedder = Arc::new(
            FakeEmbedder::new()
                .with("alpha", vec![1.0, 0.0])
                .with("gamma", vec![0.0, 1.0]),
        );
        let loaded = loader(lines, embedder, fast_options()).load().await.unwrap();
        let ids: Vec<&str> = loaded.reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(loaded.report.lines, 5);
        assert_eq!(loaded.report.skipped, 2);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let (lines, embedder) = five_reports();
        let embedder = Arc::new(embedder.rate_limited_calls(2));
        let mut options = fast_options();
        options.batch_size = 5;
        options.retry.max_attempts = 3;

        let loaded = loader(lines, embedder.clone(), options)
            .load()
            .await
            .unwrap();
        assert_eq!(loaded.report.embedded, 5);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_degrades_to_skip() {
        let lines = vec![corpus_line("a", "alpha"), corpus_line("b", "beta")];
        let embedder = Arc::new(
            FakeEmbedder::new()
                .with("alpha", vec![1.0, 0.0])
                .with("beta", vec![0.0, 1.0])
                .rate_limited_calls(2),
        );
        let mut options = fast_options();
        options.batch_size = 1;
        options.retry.max_attempts = 2;

        let loaded = loader(lines, embedder.clone(), options)
            .load()
            .await
            .unwrap();
        // First record: two rate-limited attempts, then given up.
        assert!(loaded.reports[0].embedding.is_empty());
        assert_eq!(loaded.reports[1].embedding, vec![0.0, 1.0]);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn provider_unavailable_aborts() {
        let (lines, _) = five_reports();
        let embedder = Arc::new(FakeEmbedder::new().unavailable());
        let err = loader(lines, embedder, fast_options())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Embedding(EmbedError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn zero_embeddings_is_fatal() {
        let lines = vec![corpus_line("a", "alpha"), corpus_line("b", "beta")];
        let embedder = Arc::new(FakeEmbedder::new());
        let err = loader(lines, embedder, fast_options())
            .load()
            .await
            .unwrap_err();
        assert_eq!(err, RetrievalError::NoEmbeddingsGenerated { records: 2 });
    }

    #[tokio::test]
    async fn timeout_is_a_per_record_failure() {
        let lines = vec![corpus_line("a", "alpha")];
        let embedder = Arc::new(
            FakeEmbedder::new()
                .with("alpha", vec![1.0])
                .with_delay(Duration::from_millis(200)),
        );
        let mut options = fast_options();
        options.timeout = Duration::from_millis(20);

        let err = loader(lines, embedder, options).load().await.unwrap_err();
        assert_eq!(err, RetrievalError::NoEmbeddingsGenerated { records: 1 });
    }

    #[tokio::test]
    async fn wrong_dimension_is_excluded() {
        let lines = vec![
            corpus_line("a", "alpha"),
            corpus_line("b", "beta"),
            corpus_line("c", "gamma"),
        ];
        let embedder = Arc::new(
            FakeEmbedder::new()
                .with("alpha", vec![1.0, 0.0])
                .with("beta", vec![1.0, 0.0, 0.0])
                .with("gamma", vec![f32::NAN, 0.0]),
        );
        let loaded = loader(lines, embedder, fast_options()).load().await.unwrap();
        assert_eq!(loaded.dims, 2);
        assert_eq!(loaded.report.embedded, 1);
        assert!(loaded.reports[1].embedding.is_empty());
        assert!(loaded.reports[2].embedding.is_empty());
    }

    #[tokio::test]
    async fn declared_dimension_mismatch_names_both_sizes() {
        let (lines, embedder) = five_reports();
        let embedder = Arc::new(embedder.with_dims(384));
        let err = loader(lines, embedder, fast_options())
            .load()
            .await
            .unwrap_err();
        match err {
            RetrievalError::Embedding(EmbedError::ProviderUnavailable(msg)) => {
                assert!(msg.contains("384"), "{}", msg);
                assert!(msg.contains("2-dimensional"), "{}", msg);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn declared_dimension_is_used_when_it_matches() {
        let (lines, embedder) = five_reports();
        let loaded = loader(lines, Arc::new(embedder.with_dims(2)), fast_options())
            .load()
            .await
            .unwrap();
        assert_eq!(loaded.dims, 2);
        assert_eq!(loaded.report.embedded, 5);
    }

    #[tokio::test]
    async fn concurrency_preserves_record_order() {
        let lines: Vec<String> = (0..12)
            .map(|i| corpus_line(&format!("r{}", i), &format!("text {}", i)))
            .collect();
        let mut embedder = FakeEmbedder::new();
        for i in 0..12 {
            embedder = embedder.with(&format!("text {}", i), vec![i as f32, 1.0]);
        }
        let mut options = fast_options();
        options.batch_size = 2;
        options.concurrency = 3;

        let loaded = loader(lines, Arc::new(embedder), options)
            .load()
            .await
            .unwrap();
        for (i, r) in loaded.reports.iter().enumerate() {
            assert_eq!(r.id, format!("r{}", i));
            assert_eq!(r.embedding, vec![i as f32, 1.0]);
        }
    }

    #[tokio::test]
    async fn unreadable_source_is_corpus_unavailable() {
        let source = Arc::new(crate::source::JsonlFileSource::new("/nonexistent/reports.jsonl"));
        let loader = CorpusLoader::new(source, Arc::new(FakeEmbedder::new()), fast_options());
        assert!(matches!(
            loader.load().await,
            Err(RetrievalError::CorpusUnavailable(_))
        ));
    }
}

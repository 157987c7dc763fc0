//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use guidebot_core::embedding::Embedder;
use guidebot_core::error::EmbedError;
use guidebot_core::retry::RetryPolicy;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::loader::LoaderOptions;

/// Scriptable in-memory embedder.
///
/// Texts map to fixed vectors; unknown texts fail. A batch containing a
/// `failing` text fails as a whole, like a real API rejecting one input.
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    rate_limited: AtomicUsize,
    unavailable: bool,
    delay: Duration,
    dims: Option<usize>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// Answer the first `n` calls with `RateLimited`.
    pub fn rate_limited_calls(self, n: usize) -> Self {
        self.rate_limited.store(n, Ordering::SeqCst);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Declare a fixed output dimension, like a configured provider.
    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable {
            return Err(EmbedError::ProviderUnavailable("fake backend down".into()));
        }
        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(EmbedError::RateLimited { retry_after: None });
        }
        if texts.iter().any(|t| self.failing.contains(t)) {
            return Err(EmbedError::Failed("rejected input".into()));
        }
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EmbedError::Failed(format!("unknown text '{}'", t)))
            })
            .collect()
    }
}

/// A corpus line with an explicit id.
pub fn corpus_line(id: &str, text: &str) -> String {
    serde_json::json!({ "id": id, "text": text }).to_string()
}

/// Loader options with no pacing and millisecond backoff.
pub fn fast_options() -> LoaderOptions {
    LoaderOptions {
        batch_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        },
        ..LoaderOptions::default()
    }
}

//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus the cosine similarity primitive used for ranking.
//!
//! Concrete embedders (Hugging Face, OpenAI, Ollama, fastembed,
//! pre-computed) live in the `guidebot` app crate.

use async_trait::async_trait;

use crate::error::EmbedError;

/// A text embedding backend.
///
/// Callers guarantee inputs are non-empty after trimming; implementations
/// do not re-validate. Implementations must return one vector per input,
/// in input order, and must not retry internally: retry policy belongs to
/// the corpus loader.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the declared vector dimensionality, or `None` when it is
    /// only known after the first successful embedding.
    fn dims(&self) -> Option<usize>;

    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::Failed(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// A zero-norm vector is treated as maximally dissimilar to everything and
/// scores `0.0`. Empty vectors and vectors of different lengths also score
/// `0.0`; the ranking engine rejects mismatched lengths before calling this.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Whether every component is a finite number.
pub fn is_finite_vector(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

//! Pre-computed embeddings read from a JSONL file.
//!
//! Each line is `{"text": "...", "embedding": [f32, ...]}`. Vectors are
//! keyed by the SHA-256 of the trimmed text, so lookups are exact-match
//! and fully offline. Useful for air-gapped deployments, reproducible
//! evaluation, and tests.

use async_trait::async_trait;
use guidebot_core::embedding::Embedder;
use guidebot_core::error::EmbedError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize)]
struct Entry {
    text: String,
    embedding: Vec<f32>,
}

/// Embedder backed by a fixed text → vector table.
pub struct PrecomputedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dims: Option<usize>,
    model: String,
}

impl PrecomputedEmbedder {
    /// Build from `(text, vector)` pairs.
    ///
    /// All vectors must share one dimensionality.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, EmbedError>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: AsRef<str>,
    {
        let mut vectors = HashMap::new();
        let mut dims = None;
        for (text, vector) in pairs {
            match dims {
                None => dims = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(EmbedError::ProviderUnavailable(format!(
                        "precomputed embeddings have mixed dimensions ({} and {})",
                        d,
                        vector.len()
                    )))
                }
                _ => {}
            }
            vectors.insert(text_key(text.as_ref()), vector);
        }
        Ok(Self {
            vectors,
            dims,
            model: "precomputed".to_string(),
        })
    }

    /// Load the table from a JSONL file.
    pub fn from_file(path: &Path) -> Result<Self, EmbedError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EmbedError::ProviderUnavailable(format!(
                "failed to read embeddings file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut pairs = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: Entry = serde_json::from_str(line).map_err(|e| {
                EmbedError::ProviderUnavailable(format!(
                    "{} line {}: {}",
                    path.display(),
                    n + 1,
                    e
                ))
            })?;
            pairs.push((entry.text, entry.embedding));
        }

        let mut embedder = Self::from_pairs(pairs)?;
        embedder.model = format!("precomputed:{}", path.display());
        Ok(embedder)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

fn text_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl Embedder for PrecomputedEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(&text_key(t))
                    .cloned()
                    .ok_or_else(|| EmbedError::Failed("no precomputed embedding for text".to_string()))
            })
            .collect()
    }
}

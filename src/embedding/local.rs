//! In-process embeddings via fastembed.
//!
//! The ONNX model is downloaded from Hugging Face on first use and cached;
//! afterwards embedding runs fully offline. The model is initialized
//! lazily, exactly once, even when several loads or queries race to use it.

use async_trait::async_trait;
use guidebot_core::embedding::Embedder;
use guidebot_core::error::EmbedError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Embedder running a fastembed model in-process.
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: OnceCell<Arc<Mutex<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // Validate the name up front so misconfiguration fails at startup.
        let (_, default_dims) = resolve_model(&model_name)?;
        Ok(Self {
            dims: config.dims.unwrap_or(default_dims),
            model_name,
            batch_size: config.batch_size,
            model: OnceCell::new(),
        })
    }

    async fn model(&self) -> Result<Arc<Mutex<fastembed::TextEmbedding>>, EmbedError> {
        self.model
            .get_or_try_init(|| async {
                let (model, _) = resolve_model(&self.model_name)?;
                tracing::info!(model = %self.model_name, "initializing local embedding model");
                let embedding = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(true),
                    )
                })
                .await
                .map_err(|e| EmbedError::ProviderUnavailable(format!("model init task: {}", e)))?
                .map_err(|e| {
                    EmbedError::ProviderUnavailable(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                Ok(Arc::new(Mutex::new(embedding)))
            })
            .await
            .cloned()
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize), EmbedError> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        other => Err(EmbedError::ProviderUnavailable(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let model = self.model().await?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbedError::Failed(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbedError::Failed(format!("local embedding task: {}", e)))?
    }
}

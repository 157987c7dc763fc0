//! Embedding provider implementations.
//!
//! Concrete [`Embedder`]s behind the trait defined in `guidebot-core`:
//! - **[`DisabledEmbedder`]** — fails every call; used when embeddings are not configured.
//! - **[`HuggingFaceEmbedder`]** — Hugging Face Inference API feature-extraction pipeline.
//! - **[`OpenAIEmbedder`]** — OpenAI-compatible `/v1/embeddings` endpoint.
//! - **[`OllamaEmbedder`]** — a local Ollama instance's `/api/embed` endpoint.
//! - **[`PrecomputedEmbedder`]** — vectors read from a JSONL file, keyed by text hash.
//! - **`LocalEmbedder`** — in-process fastembed model (feature `local-embeddings-fastembed`).
//!
//! # Error mapping
//!
//! Providers never retry; they classify failures and let the corpus loader
//! apply its [`RetryPolicy`](guidebot_core::retry::RetryPolicy):
//! - HTTP 429 → [`EmbedError::RateLimited`] (with `Retry-After` seconds if sent)
//! - HTTP 401/403, connection errors, missing token → [`EmbedError::ProviderUnavailable`]
//! - request timeout → [`EmbedError::Timeout`]
//! - any other failure → [`EmbedError::Failed`]

#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod precomputed;

use async_trait::async_trait;
use guidebot_core::embedding::Embedder;
use guidebot_core::error::EmbedError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;
pub use precomputed::PrecomputedEmbedder;

const HUGGINGFACE_URL: &str = "https://api-inference.huggingface.co";
const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Create the [`Embedder`] selected by `embedding.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"huggingface"` | [`HuggingFaceEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"precomputed"` | [`PrecomputedEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
///
/// # Errors
///
/// [`EmbedError::ProviderUnavailable`] for unknown providers, missing
/// configuration or credentials, or an unreadable embeddings file.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbedError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "huggingface" => Ok(Arc::new(HuggingFaceEmbedder::new(
            config,
            resolve_api_key(config)?,
        )?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(
            config,
            resolve_api_key(config)?,
        )?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "precomputed" => {
            let path = config.path.as_ref().ok_or_else(|| {
                EmbedError::ProviderUnavailable(
                    "embedding.path required for precomputed provider".to_string(),
                )
            })?;
            Ok(Arc::new(PrecomputedEmbedder::from_file(path)?))
        }
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(EmbedError::ProviderUnavailable(
            "local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(EmbedError::ProviderUnavailable(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Read the API token from the configured environment variable.
fn resolve_api_key(config: &EmbeddingConfig) -> Result<String, EmbedError> {
    let var = config.api_key_var().ok_or_else(|| {
        EmbedError::ProviderUnavailable("no API key variable configured".to_string())
    })?;
    match std::env::var(&var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(EmbedError::ProviderUnavailable(format!(
            "{} environment variable not set",
            var
        ))),
    }
}

fn required_model(config: &EmbeddingConfig, provider: &str) -> Result<String, EmbedError> {
    config.model.clone().ok_or_else(|| {
        EmbedError::ProviderUnavailable(format!("embedding.model required for {}", provider))
    })
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, EmbedError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbedError::ProviderUnavailable(format!("HTTP client: {}", e)))
}

/// Send a JSON POST and classify the outcome.
async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
    timeout: Duration,
) -> Result<Value, EmbedError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| classify_transport_error(provider, e, timeout))?;

    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| EmbedError::Failed(format!("{} response is not JSON: {}", provider, e)));
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body_text = response.text().await.unwrap_or_default();
    Err(classify_status(provider, status.as_u16(), &body_text, retry_after))
}

/// Map an HTTP error status to an [`EmbedError`].
pub(crate) fn classify_status(
    provider: &str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> EmbedError {
    match status {
        429 => EmbedError::RateLimited { retry_after },
        401 | 403 => EmbedError::ProviderUnavailable(format!(
            "{} rejected credentials ({}): {}",
            provider, status, body
        )),
        _ => EmbedError::Failed(format!("{} API error {}: {}", provider, status, body)),
    }
}

fn classify_transport_error(provider: &str, e: reqwest::Error, timeout: Duration) -> EmbedError {
    if e.is_timeout() {
        EmbedError::Timeout(timeout)
    } else if e.is_connect() {
        EmbedError::ProviderUnavailable(format!("{} connection error: {}", provider, e))
    } else {
        EmbedError::Failed(format!("{} request error: {}", provider, e))
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Convert a JSON array of numbers into a vector, rejecting non-numbers.
fn json_to_vec(value: &Value) -> Result<Vec<f32>, EmbedError> {
    value
        .as_array()
        .ok_or_else(|| EmbedError::Failed("embedding is not an array".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::Failed("embedding contains a non-number".to_string()))
        })
        .collect()
}

fn expect_count(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::Failed(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

// ============ Disabled ============

/// An embedder that fails every call.
///
/// Used when `embedding.provider = "disabled"`; loading the corpus with it
/// fails with [`EmbedError::ProviderUnavailable`].
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> Option<usize> {
        None
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::ProviderUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Hugging Face ============

/// Embedder using the Hugging Face Inference API.
///
/// Calls `POST {url}/pipeline/feature-extraction/{model}` with a bearer
/// token. Sentence-transformer models return one pooled vector per input;
/// models that return per-token vectors are mean-pooled here.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbedError> {
        let model = required_model(config, "huggingface")?;
        let dims = config.dims.ok_or_else(|| {
            EmbedError::ProviderUnavailable("embedding.dims required for huggingface".to_string())
        })?;
        Ok(Self {
            client: build_client(config.timeout())?,
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| HUGGINGFACE_URL.to_string()),
            api_key,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });
        let request = self
            .client
            .post(format!(
                "{}/pipeline/feature-extraction/{}",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .bearer_auth(&self.api_key);
        let json = post_json("huggingface", request, &body, self.timeout).await?;
        expect_count(parse_huggingface_response(&json)?, texts.len())
    }
}

/// Parse a feature-extraction response: `[[f32]]` (pooled) or
/// `[[[f32]]]` (per-token, mean-pooled).
fn parse_huggingface_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let items = json.as_array().ok_or_else(|| {
        EmbedError::Failed("invalid Hugging Face response: expected an array".to_string())
    })?;

    items
        .iter()
        .map(|item| {
            let is_token_level = item
                .as_array()
                .and_then(|a| a.first())
                .is_some_and(Value::is_array);
            if is_token_level {
                let tokens = item
                    .as_array()
                    .map(|a| a.iter().map(json_to_vec).collect::<Result<Vec<_>, _>>())
                    .unwrap_or_else(|| Ok(Vec::new()))?;
                mean_pool(&tokens)
            } else {
                json_to_vec(item)
            }
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Result<Vec<f32>, EmbedError> {
    let first = tokens
        .first()
        .ok_or_else(|| EmbedError::Failed("empty token embedding".to_string()))?;
    let mut sum = vec![0.0f32; first.len()];
    for t in tokens {
        if t.len() != sum.len() {
            return Err(EmbedError::Failed("ragged token embeddings".to_string()));
        }
        for (s, x) in sum.iter_mut().zip(t) {
            *s += x;
        }
    }
    let n = tokens.len() as f32;
    Ok(sum.into_iter().map(|s| s / n).collect())
}

// ============ OpenAI ============

/// Embedder using an OpenAI-compatible embeddings API.
///
/// Calls `POST {url}/v1/embeddings`; the API key comes from the variable
/// named by `embedding.api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbedError> {
        let model = required_model(config, "openai")?;
        let dims = config.dims.ok_or_else(|| {
            EmbedError::ProviderUnavailable("embedding.dims required for openai".to_string())
        })?;
        Ok(Self {
            client: build_client(config.timeout())?,
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key);
        let json = post_json("openai", request, &body, self.timeout).await?;
        expect_count(parse_openai_response(&json)?, texts.len())
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| EmbedError::Failed("invalid OpenAI response: missing data".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item.get("embedding").ok_or_else(|| {
            EmbedError::Failed("invalid OpenAI response: missing embedding".to_string())
        })?;
        indexed.push((index, json_to_vec(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder using a local Ollama instance.
///
/// Calls `POST {url}/api/embed` (default `http://localhost:11434`). Requires
/// an embedding model to be pulled, e.g. `ollama pull all-minilm`.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model = required_model(config, "ollama")?;
        let dims = config.dims.ok_or_else(|| {
            EmbedError::ProviderUnavailable("embedding.dims required for ollama".to_string())
        })?;
        Ok(Self {
            client: build_client(config.timeout())?,
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')));
        let json = post_json("ollama", request, &body, self.timeout).await?;
        expect_count(parse_ollama_response(&json)?, texts.len())
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    json.get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EmbedError::Failed("invalid Ollama response: missing embeddings".to_string())
        })?
        .iter()
        .map(json_to_vec)
        .collect()
}

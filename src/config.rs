//! TOML configuration parsing and validation.
//!
//! See `config/guidebot.example.toml` for a complete example. All sections
//! except `[corpus]` have defaults.

use anyhow::{bail, Context, Result};
use guidebot_core::corpus::RecordFields;
use guidebot_core::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Line-delimited JSON corpus file.
    pub path: PathBuf,
    #[serde(default = "default_text_fields")]
    pub text_fields: Vec<String>,
    #[serde(default = "default_id_fields")]
    pub id_fields: Vec<String>,
    /// Keep at most this many records.
    #[serde(default)]
    pub max_reports: Option<usize>,
    /// Report text is cut to this many characters before embedding (0 = no limit).
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
}

fn default_text_fields() -> Vec<String> {
    RecordFields::default().text_fields
}
fn default_id_fields() -> Vec<String> {
    RecordFields::default().id_fields
}
fn default_max_embed_chars() -> usize {
    2000
}

impl CorpusConfig {
    pub fn record_fields(&self) -> RecordFields {
        RecordFields {
            text_fields: self.text_fields.clone(),
            id_fields: self.id_fields.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint override for remote providers.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Embeddings file for the `precomputed` provider.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Batches in flight at once while loading.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: None,
            path: None,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    8
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    1
}
fn default_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Name of the environment variable holding the API token, if the
    /// provider uses one.
    pub fn api_key_var(&self) -> Option<String> {
        if let Some(var) = &self.api_key_env {
            return Some(var.clone());
        }
        match self.provider.as_str() {
            "huggingface" => Some("HF_API_TOKEN".to_string()),
            "openai" => Some("OPENAI_API_KEY".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: i64,
    #[serde(default = "default_max_k")]
    pub max_k: i64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_k() -> i64 {
    3
}
fn default_max_k() -> i64 {
    20
}
fn default_snippet_chars() -> usize {
    guidebot_core::search::DEFAULT_SNIPPET_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Start loading the corpus in the background at boot.
    #[serde(default = "default_preload")]
    pub preload: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            preload: default_preload(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_preload() -> bool {
    true
}

const PROVIDERS: &[&str] = &[
    "disabled",
    "huggingface",
    "openai",
    "ollama",
    "local",
    "precomputed",
];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative corpus and embedding paths are resolved against the config file.
    if let Some(base) = path.parent() {
        if config.corpus.path.is_relative() {
            config.corpus.path = base.join(&config.corpus.path);
        }
        if let Some(p) = &config.embedding.path {
            if p.is_relative() {
                config.embedding.path = Some(base.join(p));
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.corpus.text_fields.is_empty() {
        bail!("corpus.text_fields must not be empty");
    }
    if config.corpus.id_fields.is_empty() {
        bail!("corpus.id_fields must not be empty");
    }
    if config.corpus.max_reports == Some(0) {
        bail!("corpus.max_reports must be > 0");
    }

    let emb = &config.embedding;
    if !PROVIDERS.contains(&emb.provider.as_str()) {
        bail!(
            "Unknown embedding provider: '{}'. Must be one of: {}.",
            emb.provider,
            PROVIDERS.join(", ")
        );
    }
    if emb.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if emb.concurrency == 0 {
        bail!("embedding.concurrency must be > 0");
    }
    if emb.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }
    if emb.retry.max_attempts < 2 {
        bail!("embedding.retry.max_attempts must be >= 2 (at least one retry)");
    }
    if emb.retry.multiplier < 1.0 {
        bail!("embedding.retry.multiplier must be >= 1.0");
    }

    match emb.provider.as_str() {
        "huggingface" | "openai" | "ollama" => {
            if emb.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    emb.provider
                );
            }
            if emb.dims.is_none() || emb.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    emb.provider
                );
            }
        }
        "precomputed" => {
            if emb.path.is_none() {
                bail!("embedding.path must be specified when provider is 'precomputed'");
            }
        }
        _ => {}
    }

    if config.retrieval.default_k < 1 {
        bail!("retrieval.default_k must be >= 1");
    }
    if config.retrieval.max_k < config.retrieval.default_k {
        bail!("retrieval.max_k must be >= retrieval.default_k");
    }

    Ok(())
}

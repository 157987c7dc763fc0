//! HTTP retrieval server.
//!
//! Exposes the report index to the GuideBot chat backend as a small JSON
//! API. The corpus is loaded lazily by the first `POST /retrieve` (or in the
//! background at boot when `server.preload = true`).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version, model, and load state) |
//! | `GET`  | `/stats` | Corpus diagnostics |
//! | `POST` | `/retrieve` | Top-k similar reports for a query |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_query", "message": "query must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `invalid_query` | 400 |
//! | `rate_limited` | 429 |
//! | `internal` | 500 |
//! | `embedding_failed` | 502 |
//! | `not_loaded`, `provider_unavailable`, `corpus_unavailable`, `empty_index`, `no_embeddings` | 503 |
//! | `timeout` | 504 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based
//! frontends can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use guidebot_core::error::{EmbedError, RetrievalError};
use guidebot_core::models::{CorpusStats, LoadState, ScoredReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::index::ReportIndex;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    index: Arc<ReportIndex>,
    retrieval: RetrievalConfig,
}

impl AppState {
    pub fn new(index: Arc<ReportIndex>, retrieval: RetrievalConfig) -> Self {
        Self { index, retrieval }
    }
}

/// Build the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/retrieve", post(handle_retrieve))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated. Returns an error if binding fails.
pub async fn run_server(config: &Config, index: Arc<ReportIndex>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    if config.server.preload {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            // Failures are logged by the index; the next request retries.
            if index.ensure_loaded().await.is_err() {
                warn!("corpus preload failed; will retry on first request");
            }
        });
    }

    let app = router(AppState::new(index, config.retrieval.clone()));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "retrieval server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let status = match &err {
            RetrievalError::InvalidQuery => StatusCode::BAD_REQUEST,
            RetrievalError::NotLoaded
            | RetrievalError::EmptyIndex
            | RetrievalError::NoEmbeddingsGenerated { .. }
            | RetrievalError::CorpusUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RetrievalError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RetrievalError::Embedding(e) => match e {
                EmbedError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                EmbedError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                EmbedError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                EmbedError::Failed(_) => StatusCode::BAD_GATEWAY,
            },
        };
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "retrieval request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
    /// Embedding model used for the corpus and queries.
    model: String,
    /// Corpus load state; `"loaded"` once retrieval can be served.
    corpus: LoadState,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.index.model_name().to_string(),
        corpus: state.index.state(),
    })
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<CorpusStats> {
    Json(state.index.stats())
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    /// Defaults to `retrieval.default_k`; capped at `retrieval.max_k`.
    #[serde(default)]
    k: Option<i64>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<ScoredReport>,
}

/// Handler for `POST /retrieve`.
///
/// Rejects blank queries before touching the corpus, loads the corpus if
/// needed, then ranks.
async fn handle_retrieve(
    State(state): State<AppState>,
    body: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    if req.query.trim().is_empty() {
        return Err(RetrievalError::InvalidQuery.into());
    }

    let k = req
        .k
        .unwrap_or(state.retrieval.default_k)
        .min(state.retrieval.max_k);

    state.index.ensure_loaded().await?;
    let results = state.index.retrieve(&req.query, k).await?;

    Ok(Json(RetrieveResponse { results }))
}

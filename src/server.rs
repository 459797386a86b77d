//! HTTP front end for the pipelines.
//!
//! Every pipeline is exposed as a JSON `POST` route. Handlers validate the
//! body, invoke the shared [`Pipelines`] with the process-wide
//! [`AppContext`], and serialize the typed response.
//!
//! # Endpoints
//!
//! | Method | Path | Pipeline |
//! |--------|------|----------|
//! | `POST` | `/generate-boilerplate/` | boilerplate |
//! | `POST` | `/edit-code/` | code-edit |
//! | `POST` | `/explain-code/` | code-explain |
//! | `POST` | `/embed-and-store/` | embed-and-store |
//! | `POST` | `/chat-with-code/` | chat |
//! | `GET`  | `/health` | (status and version) |
//!
//! Each `POST` route is also served without the trailing slash.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_missing", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `index_missing` (404), `timeout` (408), `index_mismatch` (409),
//! `selection_not_found` (422), `pipeline_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so editor extensions and
//! browser clients can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::context::AppContext;
use crate::embedding::EmbeddingsDisabled;
use crate::index::IndexError;
use crate::models::{
    BoilerplateRequest, BoilerplateResponse, ChatRequest, ChatResponse, CodeEditRequest,
    CodeEditResponse, EmbedStoreRequest, EmbedStoreResponse, ExplainRequest, ExplainResponse,
};
use crate::patch::PatchError;
use crate::pipelines::{Pipelines, RequestError};

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    ctx: AppContext,
    pipelines: Arc<Pipelines>,
}

impl AppState {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            pipelines: Arc::new(Pipelines::new()),
        }
    }
}

/// Build the router with every route, CORS, and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate-boilerplate/", post(handle_boilerplate))
        .route("/generate-boilerplate", post(handle_boilerplate))
        .route("/edit-code/", post(handle_edit))
        .route("/edit-code", post(handle_edit))
        .route("/explain-code/", post(handle_explain))
        .route("/explain-code", post(handle_explain))
        .route("/embed-and-store/", post(handle_embed_store))
        .route("/embed-and-store", post(handle_embed_store))
        .route("/chat-with-code/", post(handle_chat))
        .route("/chat-with-code", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
///
/// Builds the configured collaborators once; every request reuses them.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = AppContext::from_config(config.clone())?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "codepilot server listening");
    println!("codepilot server listening on http://{}", bind_addr);

    serve(listener, AppState::new(ctx)).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"index_missing"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn find_cause<T: std::error::Error + Send + Sync + 'static>(err: &anyhow::Error) -> Option<&T> {
    err.downcast_ref::<T>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<T>()))
}

/// Map a pipeline failure to the most specific status and error code.
fn classify_pipeline_error(route: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);

    let app_err = if find_cause::<RequestError>(&err).is_some() {
        bad_request(msg)
    } else if find_cause::<EmbeddingsDisabled>(&err).is_some() {
        AppError::new(StatusCode::BAD_REQUEST, "embeddings_disabled", msg)
    } else if find_cause::<PatchError>(&err).is_some() {
        AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "selection_not_found", msg)
    } else if let Some(index_err) = find_cause::<IndexError>(&err) {
        match index_err {
            IndexError::Missing(_) => AppError::new(StatusCode::NOT_FOUND, "index_missing", msg),
            IndexError::ModelMismatch { .. } => {
                AppError::new(StatusCode::CONFLICT, "index_mismatch", msg)
            }
            IndexError::LengthMismatch { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "pipeline_error", msg)
            }
        }
    } else if msg.contains("timed out") {
        AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", msg)
    } else {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "pipeline_error", msg)
    };

    if app_err.status.is_server_error() {
        tracing::error!(route, error = %app_err.message, "pipeline failed");
    } else {
        tracing::warn!(route, code = app_err.code, error = %app_err.message, "request rejected");
    }
    app_err
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Pipeline routes ============

async fn handle_boilerplate(
    State(state): State<AppState>,
    body: Result<Json<BoilerplateRequest>, JsonRejection>,
) -> Result<Json<BoilerplateResponse>, AppError> {
    let Json(req) = body?;
    state
        .pipelines
        .generate_boilerplate(&state.ctx, &req)
        .await
        .map(Json)
        .map_err(|e| classify_pipeline_error("generate-boilerplate", e))
}

async fn handle_edit(
    State(state): State<AppState>,
    body: Result<Json<CodeEditRequest>, JsonRejection>,
) -> Result<Json<CodeEditResponse>, AppError> {
    let Json(req) = body?;
    state
        .pipelines
        .edit_code(&state.ctx, &req)
        .await
        .map(Json)
        .map_err(|e| classify_pipeline_error("edit-code", e))
}

async fn handle_explain(
    State(state): State<AppState>,
    body: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, AppError> {
    let Json(req) = body?;
    state
        .pipelines
        .explain_code(&state.ctx, &req)
        .await
        .map(Json)
        .map_err(|e| classify_pipeline_error("explain-code", e))
}

async fn handle_embed_store(
    State(state): State<AppState>,
    body: Result<Json<EmbedStoreRequest>, JsonRejection>,
) -> Result<Json<EmbedStoreResponse>, AppError> {
    let Json(req) = body?;
    state
        .pipelines
        .embed_and_store(&state.ctx, &req)
        .await
        .map(Json)
        .map_err(|e| classify_pipeline_error("embed-and-store", e))
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = body?;
    state
        .pipelines
        .chat(&state.ctx, &req)
        .await
        .map(Json)
        .map_err(|e| classify_pipeline_error("chat-with-code", e))
}

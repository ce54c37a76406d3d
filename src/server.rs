//! JSON HTTP API over saved analyses.
//!
//! Lets a dashboard or script submit CSV text for analysis and browse,
//! rename, delete and export the saved reports.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/analyses` | Session summaries, oldest first |
//! | `GET`    | `/analyses/{id}` | Full session including the report |
//! | `DELETE` | `/analyses/{id}` | Delete a session |
//! | `PUT`    | `/analyses/{id}/name` | Rename (`{"name": "..."}`) |
//! | `GET`    | `/analyses/{id}/export/{format}` | `json` or `csv` download |
//! | `POST`   | `/analyze` | Analyze `{"csv", "name"?, "policy"?}` and save |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "csv must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `backend_error` (502),
//! `aggregation_error` (500), `internal` (500).

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analyzer::{create_analyzer, BatchAnalyzer};
use crate::config::Config;
use crate::error::PipelineError;
use crate::export::{render, ExportFormat};
use crate::models::AnalysisSession;
use crate::normalize::{normalize_csv, NormalizePolicy};
use crate::pipeline::{run_analysis, RunContext};
use crate::progress::NoProgress;
use crate::store::sqlite::SqliteReportStore;
use crate::store::{session_for, ReportStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn ReportStore>,
    analyzer: Arc<dyn BatchAnalyzer>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ReportStore>,
        analyzer: Arc<dyn BatchAnalyzer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            analyzer,
        }
    }
}

/// Build the router with CORS enabled for all origins.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/analyses", get(handle_list))
        .route("/analyses/{id}", get(handle_get).delete(handle_delete))
        .route("/analyses/{id}/name", put(handle_rename))
        .route("/analyses/{id}/export/{format}", get(handle_export))
        .route("/analyze", post(handle_analyze))
        .layer(cors)
        .with_state(state)
}

/// `fbh serve`: bind to `[server].bind` and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteReportStore::open(config).await?;
    let analyzer: Arc<dyn BatchAnalyzer> = Arc::from(create_analyzer(&config.llm)?);
    let bind_addr = config.server.bind.clone();

    tracing::info!(analyzer = %analyzer.name(), "starting server");
    let state = AppState::new(config.clone(), Arc::new(store), analyzer);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Feedback Harness listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    /// Whether sending the same request again may succeed.
    retryable: bool,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                retryable: self.retryable,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        retryable: false,
    }
}

fn not_found(id: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("analysis not found: {}", id),
        retryable: false,
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
        retryable: false,
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match &err {
            PipelineError::EmptyInput | PipelineError::InvalidBatchSize => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            PipelineError::Transport { .. }
            | PipelineError::MalformedResponse { .. }
            | PipelineError::SchemaViolation { .. } => (StatusCode::BAD_GATEWAY, "backend_error"),
            PipelineError::Aggregation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "aggregation_error")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
            retryable: err.is_retryable_by_caller(),
        }
    }
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

// ============ Sessions ============

/// Listing row: a session without its report body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub created: i64,
    pub feedback_count: usize,
    pub nps_score: i64,
}

impl From<&AnalysisSession> for SessionSummary {
    fn from(s: &AnalysisSession) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            created: s.created,
            feedback_count: s.feedback_count,
            nps_score: s.nps_score,
        }
    }
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let sessions = state.store.list().await.map_err(internal)?;
    Ok(Json(sessions.iter().map(SessionSummary::from).collect()))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisSession>, AppError> {
    match state.store.get(&id).await.map_err(internal)? {
        Some(session) => Ok(Json(session)),
        None => Err(not_found(&id)),
    }
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete(&id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

async fn handle_rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    if !state.store.rename(&id, name).await.map_err(internal)? {
        return Err(not_found(&id));
    }
    Ok(Json(serde_json::json!({ "id": id, "name": name })))
}

async fn handle_export(
    State(state): State<AppState>,
    Path((id, format)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let format: ExportFormat = format.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
    let session = state
        .store
        .get(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(&id))?;

    let body = render(&session.result, format).map_err(internal)?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

// ============ POST /analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    csv: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    policy: Option<String>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalysisSession>), AppError> {
    if req.csv.trim().is_empty() {
        return Err(bad_request("csv must not be empty"));
    }

    let policy: NormalizePolicy = match &req.policy {
        Some(p) => p.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => state
            .config
            .analysis
            .policy()
            .map_err(|e| bad_request(e.to_string()))?,
    };
    let normalized = normalize_csv(&req.csv, policy).map_err(|e| bad_request(e.to_string()))?;

    let ctx = RunContext {
        analyzer: state.analyzer.as_ref(),
        batch_size: state.config.analysis.batch_size,
        concurrency: state.config.analysis.concurrency,
        progress: &NoProgress,
    };
    let result = run_analysis(&normalized.records, &ctx).await?;

    state
        .store
        .save(&result, req.name.as_deref())
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(session_for(&result, req.name.as_deref())),
    ))
}

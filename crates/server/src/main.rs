use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use server_api::{get_file, list_file_events, list_files, transition_file, ApiContext};
use shared::{
    domain::{FileEvent, FileId, FileRecord, FileWithEvents},
    error::{ApiError, ErrorCode},
    protocol::{ErrorResponse, UpdateFileRequest},
};
use storage::{Store, SystemClock};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

mod config;

use config::load_settings;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let store = Store::seed(settings.seed_count, Arc::new(SystemClock));
    info!(seed_count = settings.seed_count, "store seeded");

    let state = AppState {
        api: ApiContext { store },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/files", get(http_list_files))
        .route("/api/files/:id", get(http_get_file))
        .route("/api/files/:id", patch(http_update_file))
        .route("/api/files/:id/events", get(http_list_file_events))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Maps the api error taxonomy onto HTTP statuses with the uniform
/// `{"error": "..."}` body. No error escapes a handler unmapped.
fn error_response(err: ApiError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match err.code {
        ErrorCode::Internal => tracing::error!(message = %err.message, "request failed"),
        _ => tracing::debug!(code = ?err.code, message = %err.message, "request rejected"),
    }
    (status, Json(ErrorResponse::new(err.message)))
}

async fn http_list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FileRecord>>, (StatusCode, Json<ErrorResponse>)> {
    let files = list_files(&state.api).await.map_err(error_response)?;
    Ok(Json(files))
}

async fn http_get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileWithEvents>, (StatusCode, Json<ErrorResponse>)> {
    let detail = get_file(&state.api, &FileId::new(id))
        .await
        .map_err(error_response)?;
    Ok(Json(detail))
}

async fn http_update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateFileRequest>,
) -> Result<Json<FileWithEvents>, (StatusCode, Json<ErrorResponse>)> {
    let updated = transition_file(&state.api, &FileId::new(id), &req)
        .await
        .map_err(error_response)?;
    Ok(Json(updated))
}

async fn http_list_file_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileEvent>>, (StatusCode, Json<ErrorResponse>)> {
    let events = list_file_events(&state.api, &FileId::new(id))
        .await
        .map_err(error_response)?;
    Ok(Json(events))
}

use shared::{
    domain::{FileEvent, FileId, FileRecord, FileWithEvents, Stage},
    error::{ApiError, ErrorCode},
    protocol::UpdateFileRequest,
};
use storage::Store;
use tracing::info;

const FILE_NOT_FOUND: &str = "File not found";

#[derive(Clone)]
pub struct ApiContext {
    pub store: Store,
}

pub async fn list_files(ctx: &ApiContext) -> Result<Vec<FileRecord>, ApiError> {
    Ok(ctx.store.list_files().await)
}

pub async fn get_file(ctx: &ApiContext, id: &FileId) -> Result<FileWithEvents, ApiError> {
    ctx.store
        .get_file_with_events(id)
        .await
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, FILE_NOT_FOUND))
}

pub async fn list_file_events(
    ctx: &ApiContext,
    id: &FileId,
) -> Result<Vec<FileEvent>, ApiError> {
    ctx.store
        .list_events(id)
        .await
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, FILE_NOT_FOUND))
}

/// Validates the requested stage, applies it, and returns the record with
/// its full event history. The store appends the transition event under the
/// same write lock that updates the record.
pub async fn transition_file(
    ctx: &ApiContext,
    id: &FileId,
    request: &UpdateFileRequest,
) -> Result<FileWithEvents, ApiError> {
    let raw_stage = request
        .stage
        .as_deref()
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "stage is required"))?;
    let stage: Stage = raw_stage
        .parse()
        .map_err(|_| ApiError::new(ErrorCode::Validation, format!("invalid stage '{raw_stage}'")))?;

    let updated = ctx
        .store
        .transition_file(id, stage, request.details.clone())
        .await
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, FILE_NOT_FOUND))?;

    info!(file_id = %id, stage = %stage, "stage transition applied");
    Ok(updated)
}

use crate::AppState;
use crate::api::error::AppError;
use crate::services::upload::SessionState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub request_id: String,
    pub bytes_received: u64,
    pub bytes_expected: Option<u64>,
    pub percent: Option<u8>,
    pub state: SessionState,
}

#[utoipa::path(
    get,
    path = "/api/uploadProgress/{request_id}",
    params(
        ("request_id" = String, Path, description = "x-request-id of the upload request")
    ),
    responses(
        (status = 200, description = "Last observed progress", body = ProgressResponse),
        (status = 404, description = "No upload tracked under this id")
    ),
    tag = "uploads"
)]
pub async fn upload_progress(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state
        .progress
        .get(&request_id)
        .ok_or_else(|| AppError::UnknownUpload(request_id.clone()))?;

    Ok(Json(ProgressResponse {
        request_id,
        bytes_received: progress.bytes_received,
        bytes_expected: progress.bytes_expected,
        percent: progress.percent(),
        state: progress.state,
    }))
}

use crate::AppState;
use crate::api::error::AppError;
use crate::services::reaper::ReapOutcome;
use crate::utils::validation::resolve_within_root;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct DeleteRequest {
    /// Path returned by an upload, relative to the data root
    #[serde(rename = "filePath")]
    #[validate(length(min = 1, message = "No file path provided"))]
    pub file_path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReapOutcome>,
}

#[utoipa::path(
    delete,
    path = "/api/deleteZip",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "File deleted or already absent", body = DeleteResponse),
        (status = 400, description = "Missing or invalid path", body = DeleteResponse),
        (status = 500, description = "Deletion failed", body = DeleteResponse)
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> (StatusCode, Json<DeleteResponse>) {
    match delete_inner(&state, payload).await {
        Ok(outcome) => {
            let message = match outcome {
                ReapOutcome::Removed => "File deleted successfully",
                ReapOutcome::AlreadyAbsent => "File already deleted",
            };
            (
                StatusCode::OK,
                Json(DeleteResponse {
                    success: true,
                    message: message.to_string(),
                    outcome: Some(outcome),
                }),
            )
        }
        Err(e) => {
            let status = e.status();
            (
                status,
                Json(DeleteResponse {
                    success: false,
                    message: e.public_message(),
                    outcome: None,
                }),
            )
        }
    }
}

async fn delete_inner(
    state: &AppState,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<ReapOutcome, AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let path = resolve_within_root(&state.config.data_root, &req.file_path)?;
    state.reaper.reap(&path).await
}

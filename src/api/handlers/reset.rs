use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearedDirectory {
    pub directory: String,
    pub removed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    pub success: bool,
    pub cleared: Vec<ClearedDirectory>,
}

/// Clears everything derived from uploads. Uploaded files stay.
#[utoipa::path(
    post,
    path = "/api/reset",
    responses(
        (status = 200, description = "Derived directories cleared", body = ResetResponse),
        (status = 500, description = "Deletion failed")
    ),
    tag = "files"
)]
pub async fn reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    let mut cleared = Vec::new();

    for dir in state.config.derived_dirs() {
        let removed = match state.reaper.clear_contents(&dir).await {
            Ok(n) => n,
            Err(AppError::NotFound(_)) => {
                tokio::fs::create_dir_all(&dir).await?;
                0
            }
            Err(e) => return Err(e),
        };
        cleared.push(ClearedDirectory {
            directory: state.config.relative_to_root(&dir),
            removed,
        });
    }

    Ok(Json(ResetResponse {
        success: true,
        cleared,
    }))
}

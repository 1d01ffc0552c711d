use crate::AppState;
use crate::api::error::AppError;
use crate::services::archive::{ArchiveEntry, list_entries};
use crate::services::tabular::{self, TabularPreview};
use crate::utils::validation::resolve_within_root;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PreviewQuery {
    /// Stored file, relative to the data root
    pub path: String,
    /// Maximum number of data rows (CSV only)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArchivePreviewResponse {
    pub path: String,
    pub entries: Vec<ArchiveEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TabularPreviewResponse {
    pub path: String,
    pub preview: TabularPreview,
}

#[utoipa::path(
    get,
    path = "/api/previewZip",
    params(PreviewQuery),
    responses(
        (status = 200, description = "Archive entries", body = ArchivePreviewResponse),
        (status = 404, description = "Archive not found"),
        (status = 422, description = "Archive unreadable")
    ),
    tag = "preview"
)]
pub async fn preview_zip(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ArchivePreviewResponse>, AppError> {
    let archive = resolve_within_root(&state.config.data_root, &query.path)?;

    let entries = tokio::task::spawn_blocking(move || list_entries(&archive))
        .await
        .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??;

    Ok(Json(ArchivePreviewResponse {
        path: query.path,
        entries,
    }))
}

#[utoipa::path(
    get,
    path = "/api/previewCsv",
    params(PreviewQuery),
    responses(
        (status = 200, description = "Header and leading rows", body = TabularPreviewResponse),
        (status = 404, description = "CSV file not found"),
        (status = 422, description = "CSV file unreadable")
    ),
    tag = "preview"
)]
pub async fn preview_csv(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<TabularPreviewResponse>, AppError> {
    let csv_path = resolve_within_root(&state.config.data_root, &query.path)?;
    let limit = query.limit.unwrap_or(state.config.preview_row_limit);

    let preview = tokio::task::spawn_blocking(move || tabular::preview(&csv_path, limit))
        .await
        .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??;

    Ok(Json(TabularPreviewResponse {
        path: query.path,
        preview,
    }))
}

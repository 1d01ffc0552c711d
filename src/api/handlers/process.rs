use crate::AppState;
use crate::api::error::AppError;
use crate::services::pipeline::PipelineRequest;
use crate::services::tabular::MergeReport;
use crate::services::transcripts::MaterializeReport;
use crate::utils::validation::resolve_within_root;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ProcessRequest {
    #[serde(rename = "zipPath")]
    #[validate(length(min = 1, message = "No ZIP file path provided"))]
    pub zip_path: String,
    #[serde(rename = "csvPaths")]
    #[validate(length(min = 1, message = "At least one CSV file path is required"))]
    pub csv_paths: Vec<String>,
    /// Also pack the dataset into a ZIP bundle
    #[serde(default)]
    pub package: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessResponse {
    pub success: bool,
    pub workspace: String,
    pub merged: String,
    pub dataset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    pub merge: MergeReport,
    pub transcripts: MaterializeReport,
}

#[utoipa::path(
    post,
    path = "/api/process",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Dataset built", body = ProcessResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Input not found"),
        (status = 422, description = "Header mismatch or unreadable input")
    ),
    tag = "processing"
)]
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let root = &state.config.data_root;
    let archive = resolve_within_root(root, &req.zip_path)?;
    let tables = req
        .csv_paths
        .iter()
        .map(|p| resolve_within_root(root, p))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        "⚙️  Processing {} with {} CSV files",
        archive.display(),
        tables.len()
    );

    let outcome = state
        .pipeline
        .run(PipelineRequest {
            archive,
            tables,
            package: req.package,
        })
        .await?;

    let config = &state.config;
    Ok(Json(ProcessResponse {
        success: true,
        workspace: config.relative_to_root(&outcome.workspace),
        merged: config.relative_to_root(&outcome.merge.output),
        dataset: config.relative_to_root(&outcome.dataset),
        bundle: outcome.bundle.as_deref().map(|b| config.relative_to_root(b)),
        merge: outcome.merge,
        transcripts: outcome.transcripts,
    }))
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No upload tracked for request {0}")]
    UnknownUpload(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload failed for {}: {source}", .path.display())]
    UploadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("CSV file headers mismatch in {}", .file.display())]
    SchemaMismatch { file: PathBuf },

    #[error("No headers found in the provided CSV files")]
    NoHeaderFound,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Failed to delete {}: {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable category reported alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::NotFound(_) | AppError::UnknownUpload(_) => "NotFound",
            AppError::Io(_) => "IOFailure",
            AppError::UploadFailed { .. } => "UploadFailed",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::SchemaMismatch { .. } => "SchemaMismatch",
            AppError::NoHeaderFound => "NoHeaderFound",
            AppError::Csv(_) => "InvalidCsv",
            AppError::ExtractionFailed(_) => "ExtractionFailed",
            AppError::DeleteFailed { .. } => "DeleteFailed",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::UnknownUpload(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::SchemaMismatch { .. }
            | AppError::NoHeaderFound
            | AppError::Csv(_)
            | AppError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Io(_)
            | AppError::UploadFailed { .. }
            | AppError::DeleteFailed { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Io(e) => {
                tracing::error!("I/O failure: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::UploadFailed { path, source } => {
                tracing::error!("Upload failed for {}: {:?}", path.display(), source);
                self.to_string()
            }
            AppError::DeleteFailed { path, source } => {
                tracing::error!("Delete failed for {}: {:?}", path.display(), source);
                self.to_string()
            }
            other => {
                tracing::warn!("{}", other);
                other.to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();

        let body = Json(json!({
            "success": false,
            "kind": self.kind(),
            "error": message
        }));

        (status, body).into_response()
    }
}

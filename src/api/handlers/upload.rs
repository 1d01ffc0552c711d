use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::request_id::request_id;
use crate::services::upload::{LogProgress, SessionState, StoredArtifact, UploadSink};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode, header},
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct SkippedUpload {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// First stored file, relative to the data root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub paths: Vec<String>,
    pub skipped: Vec<SkippedUpload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/uploadZip",
    request_body(content = Multipart, description = "ZIP archive in the `zipFile` field"),
    responses(
        (status = 200, description = "Archive stored", body = UploadResponse),
        (status = 400, description = "Missing boundary or no .zip file in the payload", body = UploadResponse),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Upload failed")
    ),
    tag = "uploads"
)]
pub async fn upload_zip(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    receive_uploads(&state, &state.archive_sink, &headers, multipart).await
}

#[utoipa::path(
    post,
    path = "/api/uploadCSVs",
    request_body(content = Multipart, description = "One or more CSV files in `csvFiles` fields"),
    responses(
        (status = 200, description = "CSV files stored", body = UploadResponse),
        (status = 400, description = "Missing boundary or no .csv file in the payload", body = UploadResponse),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Upload failed")
    ),
    tag = "uploads"
)]
pub async fn upload_csvs(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    receive_uploads(&state, &state.tabular_sink, &headers, multipart).await
}

/// Boundary parameter of a `multipart/form-data` content type
pub fn multipart_boundary(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .and_then(|m| m.get_param(mime::BOUNDARY).map(|b| b.as_str().to_string()))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("No boundary found in headers".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::InvalidRequest(err_msg)
    }
}

/// Files stored so far by one request.
///
/// Dropped without [`StoredBatch::settle`] (the request future was
/// cancelled), every file is removed again.
#[derive(Default)]
struct StoredBatch {
    artifacts: Vec<StoredArtifact>,
    settled: bool,
}

impl StoredBatch {
    fn push(&mut self, artifact: StoredArtifact) {
        self.artifacts.push(artifact);
    }

    fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Takes the files out; dropping the batch no longer touches them
    fn settle(mut self) -> Vec<StoredArtifact> {
        self.settled = true;
        std::mem::take(&mut self.artifacts)
    }
}

impl Drop for StoredBatch {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        for artifact in &self.artifacts {
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => tracing::warn!(
                    "🧹 Removed {} from an abandoned upload request",
                    artifact.path.display()
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(
                    "Failed to roll back {}: {}",
                    artifact.path.display(),
                    e
                ),
            }
        }
    }
}

/// Errors that only concern the file being written, not the request
fn rejects_single_file(e: &AppError) -> bool {
    matches!(e, AppError::InvalidRequest(_) | AppError::PayloadTooLarge(_))
}

/// Streams every file field accepted by `sink` to disk, one at a time.
///
/// A file that is refused on its own (wrong extension, unusable name, over
/// the size limit) is skipped and reported; its siblings continue. A broken
/// request stream or a failed write removes everything this request stored.
async fn receive_uploads(
    state: &AppState,
    sink: &UploadSink,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let boundary = multipart_boundary(headers)?;
    let mut multipart = multipart.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let bytes_expected = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let request_id = request_id(headers).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let tracker = state.progress.track(&request_id, bytes_expected);

    let mut stored = StoredBatch::default();
    let mut skipped: Vec<SkippedUpload> = Vec::new();

    // Capture the error so the rest of the body can be drained first
    let result: Result<(), AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(filename) = field.file_name().map(str::to_string) else {
                tracing::debug!(
                    "Ignoring non-file field {}",
                    field.name().unwrap_or_default()
                );
                continue;
            };

            if !sink.accepts(&filename) {
                tracing::warn!(
                    "Uploaded file {} is not a {}, skipping",
                    filename,
                    sink.kind().label()
                );
                skipped.push(SkippedUpload {
                    reason: format!("Only .{} files are accepted", sink.kind().extension()),
                    filename,
                });
                continue;
            }

            // Content-Length covers the whole request; per-file totals are unknown
            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let observer = (LogProgress::new(filename.clone()), &tracker);
            match sink
                .store(&boundary, &filename, None, reader, &observer)
                .await
            {
                Ok(artifact) => stored.push(artifact),
                Err(e) if rejects_single_file(&e) => {
                    tracing::warn!("Skipping {}: {}", filename, e);
                    skipped.push(SkippedUpload {
                        reason: e.public_message(),
                        filename,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
        tracker.finish(SessionState::Failed);

        for artifact in stored.settle() {
            if let Err(cleanup) = state.reaper.reap(&artifact.path).await {
                tracing::error!(
                    "Failed to roll back {}: {}",
                    artifact.path.display(),
                    cleanup
                );
            }
        }
        return Err(e);
    }

    if stored.is_empty() {
        tracker.finish(SessionState::Failed);
        let error = format!("No {} found in the upload", sink.kind().label());
        tracing::warn!("{}", error);
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(UploadResponse {
                success: false,
                path: None,
                paths: Vec::new(),
                skipped,
                error: Some(error),
            }),
        ));
    }

    tracker.finish(SessionState::Complete);
    let paths: Vec<String> = stored
        .settle()
        .iter()
        .map(|a| state.config.relative_to_root(&a.path))
        .collect();

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            success: true,
            path: paths.first().cloned(),
            paths,
            skipped,
            error: None,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::upload::ArtifactKind;
    use axum::http::HeaderValue;

    fn artifact(path: std::path::PathBuf) -> StoredArtifact {
        StoredArtifact {
            path,
            kind: ArtifactKind::Tabular,
            original_name: "a.csv".to_string(),
            size: 2,
            sha256: String::new(),
        }
    }

    #[test]
    fn test_abandoned_batch_removes_stored_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let kept = dir.path().join("1-kept.csv");
        let abandoned = dir.path().join("2-abandoned.csv");
        std::fs::write(&kept, b"id").unwrap();
        std::fs::write(&abandoned, b"id").unwrap();

        let mut settled = StoredBatch::default();
        settled.push(artifact(kept.clone()));
        assert_eq!(settled.settle().len(), 1);

        let mut batch = StoredBatch::default();
        batch.push(artifact(abandoned.clone()));
        drop(batch);

        assert!(kept.exists());
        assert!(!abandoned.exists());
    }

    #[test]
    fn test_single_file_errors_do_not_fail_the_request() {
        assert!(rejects_single_file(&AppError::InvalidRequest("x".into())));
        assert!(rejects_single_file(&AppError::PayloadTooLarge("x".into())));
        assert!(!rejects_single_file(&AppError::UploadFailed {
            path: "a".into(),
            source: std::io::Error::other("reset"),
        }));
    }

    #[test]
    fn test_boundary_is_required() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            multipart_boundary(&headers),
            Err(AppError::InvalidRequest(_))
        ));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data"),
        );
        assert!(multipart_boundary(&headers).is_err());

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=----abc123"),
        );
        assert_eq!(multipart_boundary(&headers).unwrap(), "----abc123");
    }
}

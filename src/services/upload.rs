use crate::api::error::AppError;
use crate::config::StorageConfig;
use crate::utils::{MAX_CLAIM_ATTEMPTS, unix_millis};
use crate::utils::validation::{has_extension, sanitize_filename};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use utoipa::ToSchema;

/// Progress log granularity when the total size is unknown
const LOG_STEP_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Archive,
    Tabular,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Archive => "zip",
            ArtifactKind::Tabular => "csv",
        }
    }

    pub fn root_dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Archive => "uploadedZip",
            ArtifactKind::Tabular => "uploadedCSVs",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Archive => "ZIP archive",
            ArtifactKind::Tabular => "CSV file",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Pending,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadProgress {
    pub bytes_received: u64,
    pub bytes_expected: Option<u64>,
    pub state: SessionState,
}

impl UploadProgress {
    pub fn percent(&self) -> Option<u8> {
        let expected = self.bytes_expected.filter(|e| *e > 0)?;
        Some((self.bytes_received.saturating_mul(100) / expected).min(100) as u8)
    }
}

/// Receives cumulative progress while an upload is being written.
///
/// Observers are advisory: nothing they do can fail the upload.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &UploadProgress);
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _progress: &UploadProgress) {}
}

impl ProgressObserver for tokio::sync::watch::Sender<UploadProgress> {
    fn on_progress(&self, progress: &UploadProgress) {
        self.send_replace(*progress);
    }
}

impl<T: ProgressObserver + ?Sized> ProgressObserver for &T {
    fn on_progress(&self, progress: &UploadProgress) {
        (**self).on_progress(progress);
    }
}

impl<A: ProgressObserver, B: ProgressObserver> ProgressObserver for (A, B) {
    fn on_progress(&self, progress: &UploadProgress) {
        self.0.on_progress(progress);
        self.1.on_progress(progress);
    }
}

/// Emits a tracing event every 10% (or every 64 MB when the total is unknown)
pub struct LogProgress {
    label: String,
    last_step: AtomicU64,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_step: AtomicU64::new(0),
        }
    }
}

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: &UploadProgress) {
        match progress.state {
            SessionState::Complete => {
                tracing::info!(
                    "✅ Upload {} complete ({} bytes)",
                    self.label,
                    progress.bytes_received
                );
            }
            SessionState::Failed => {
                tracing::warn!(
                    "❌ Upload {} failed after {} bytes",
                    self.label,
                    progress.bytes_received
                );
            }
            SessionState::Pending => {
                let step = match progress.percent() {
                    Some(pct) => u64::from(pct / 10),
                    None => progress.bytes_received / LOG_STEP_BYTES,
                };
                if step > self.last_step.fetch_max(step, Ordering::Relaxed) {
                    tracing::debug!(
                        "📦 Upload {}: {} bytes received ({:?}%)",
                        self.label,
                        progress.bytes_received,
                        progress.percent()
                    );
                }
            }
        }
    }
}

/// A file persisted under one of the upload roots
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoredArtifact {
    #[schema(value_type = String)]
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub original_name: String,
    pub size: u64,
    pub sha256: String,
}

/// State of one file being received.
///
/// Dropping a session that has not completed removes its file, so a
/// cancelled upload never leaves a partial file behind.
#[derive(Debug)]
pub struct UploadSession {
    pub boundary: String,
    pub original_name: String,
    pub sanitized_name: String,
    pub storage_path: PathBuf,
    pub kind: ArtifactKind,
    pub progress: UploadProgress,
    file: Option<File>,
}

impl UploadSession {
    pub fn state(&self) -> SessionState {
        self.progress.state
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.progress.state != SessionState::Complete {
            discard_partial(&self.storage_path);
        }
    }
}

/// Streams incoming bytes to `{root}/{timestamp}-{name}` without buffering
/// the payload in memory.
#[derive(Debug, Clone)]
pub struct UploadSink {
    root: PathBuf,
    kind: ArtifactKind,
    buffer_size: usize,
    max_size: u64,
}

impl UploadSink {
    pub fn new(config: &StorageConfig, kind: ArtifactKind) -> Self {
        Self {
            root: config.upload_dir(kind),
            kind,
            buffer_size: config.write_buffer_size.max(1),
            max_size: config.max_upload_size as u64,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn accepts(&self, filename: &str) -> bool {
        has_extension(filename, self.kind.extension())
    }

    /// Validates the name and claims a unique storage path.
    ///
    /// The target file is created here, so a failing upload root surfaces
    /// before any byte has been read from the client.
    pub async fn open_session(
        &self,
        boundary: &str,
        original_name: &str,
        bytes_expected: Option<u64>,
    ) -> Result<UploadSession, AppError> {
        if !self.accepts(original_name) {
            return Err(AppError::InvalidRequest(format!(
                "Uploaded file {} is not a {}",
                original_name,
                self.kind.label()
            )));
        }

        let sanitized_name = sanitize_filename(original_name)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| AppError::UploadFailed {
                path: self.root.clone(),
                source,
            })?;
        let root = std::path::absolute(&self.root).map_err(|source| AppError::UploadFailed {
            path: self.root.clone(),
            source,
        })?;

        let (storage_path, file) = claim_storage_path(&root, unix_millis(), &sanitized_name).await?;
        tracing::info!(
            "📥 Receiving {} as {}",
            original_name,
            storage_path.display()
        );

        Ok(UploadSession {
            boundary: boundary.to_string(),
            original_name: original_name.to_string(),
            sanitized_name,
            storage_path,
            kind: self.kind,
            progress: UploadProgress {
                bytes_received: 0,
                bytes_expected,
                state: SessionState::Pending,
            },
            file: Some(file),
        })
    }

    /// Pipes `reader` into the session's file.
    ///
    /// Returns only after the file is flushed, synced and closed. On any
    /// failure the partial file is removed before the error is returned;
    /// if the future is dropped instead, dropping the session removes it.
    pub async fn write<R>(
        &self,
        session: &mut UploadSession,
        reader: R,
        observer: &dyn ProgressObserver,
    ) -> Result<StoredArtifact, AppError>
    where
        R: AsyncRead + Unpin,
    {
        let file = session
            .file
            .take()
            .ok_or_else(|| AppError::Internal("Upload session already consumed".to_string()))?;

        match self.pump(session, file, reader, observer).await {
            Ok(sha256) => {
                session.progress.state = SessionState::Complete;
                observer.on_progress(&session.progress);
                Ok(StoredArtifact {
                    path: session.storage_path.clone(),
                    kind: self.kind,
                    original_name: session.original_name.clone(),
                    size: session.progress.bytes_received,
                    sha256,
                })
            }
            Err(e) => {
                session.progress.state = SessionState::Failed;
                observer.on_progress(&session.progress);
                discard_partial(&session.storage_path);
                Err(e)
            }
        }
    }

    /// Opens a session and writes `reader` to it
    pub async fn store<R>(
        &self,
        boundary: &str,
        original_name: &str,
        bytes_expected: Option<u64>,
        reader: R,
        observer: &dyn ProgressObserver,
    ) -> Result<StoredArtifact, AppError>
    where
        R: AsyncRead + Unpin,
    {
        let mut session = self
            .open_session(boundary, original_name, bytes_expected)
            .await?;
        self.write(&mut session, reader, observer).await
    }

    async fn pump<R>(
        &self,
        session: &mut UploadSession,
        mut file: File,
        mut reader: R,
        observer: &dyn ProgressObserver,
    ) -> Result<String, AppError>
    where
        R: AsyncRead + Unpin,
    {
        let path = session.storage_path.clone();
        let upload_failed = |source: io::Error| AppError::UploadFailed {
            path: path.clone(),
            source,
        };

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let n = reader.read(&mut buffer).await.map_err(|e| {
                if e.to_string().contains("length limit exceeded") {
                    AppError::PayloadTooLarge(
                        "Request body exceeds the maximum allowed limit".to_string(),
                    )
                } else {
                    upload_failed(e)
                }
            })?;
            if n == 0 {
                break;
            }

            let received = session.progress.bytes_received + n as u64;
            if received > self.max_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "File exceeds the maximum upload size of {} MB",
                    self.max_size / 1024 / 1024
                )));
            }

            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await.map_err(upload_failed)?;
            session.progress.bytes_received = received;
            observer.on_progress(&session.progress);
        }

        file.flush().await.map_err(upload_failed)?;
        file.sync_all().await.map_err(upload_failed)?;
        drop(file);

        Ok(hex::encode(hasher.finalize()))
    }
}

async fn claim_storage_path(
    root: &Path,
    started_at: i64,
    name: &str,
) -> Result<(PathBuf, File), AppError> {
    for bump in 0..MAX_CLAIM_ATTEMPTS {
        let candidate = root.join(format!("{}-{}", started_at + bump, name));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(AppError::UploadFailed {
                    path: candidate,
                    source,
                });
            }
        }
    }

    Err(AppError::UploadFailed {
        path: root.join(name),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free storage name"),
    })
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!("🧹 Removed partial upload {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!(
            "Failed to remove partial upload {}: {}",
            path.display(),
            e
        ),
    }
}

use crate::api::error::AppError;
use crate::config::StorageConfig;
use crate::utils::claim_unique_dir;
use crate::utils::validation::normalized_relative;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
}

/// Unpacks stored ZIP archives into fresh `extracted_{timestamp}` workspaces
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    root: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_root(config.extraction_dir())
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracts every entry of `archive_path` into a new workspace and
    /// returns the workspace's absolute path.
    ///
    /// A corrupt archive leaves the partially filled workspace on disk.
    pub fn extract(&self, archive_path: &Path) -> Result<PathBuf, AppError> {
        if !archive_path.exists() {
            return Err(AppError::NotFound(archive_path.to_path_buf()));
        }

        let workspace = claim_unique_dir(&self.root, "extracted_")?;

        match unpack(archive_path, &workspace) {
            Ok(count) => {
                tracing::info!(
                    "🗜️  Extracted {} entries from {} into {}",
                    count,
                    archive_path.display(),
                    workspace.display()
                );
                Ok(workspace)
            }
            Err(e) => {
                tracing::error!(
                    "Error extracting {}: {} (workspace {} left for inspection)",
                    archive_path.display(),
                    e,
                    workspace.display()
                );
                Err(e)
            }
        }
    }

    /// Runs [`ArchiveExtractor::extract`] on the blocking pool
    pub async fn extract_blocking(&self, archive_path: PathBuf) -> Result<PathBuf, AppError> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&archive_path))
            .await
            .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))?
    }
}

fn unpack(archive_path: &Path, workspace: &Path) -> Result<usize, AppError> {
    let file = File::open(archive_path).map_err(|e| {
        AppError::ExtractionFailed(format!("Cannot open {}: {}", archive_path.display(), e))
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| AppError::ExtractionFailed(format!("Failed to parse ZIP: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AppError::ExtractionFailed(format!("Failed to read ZIP entry: {}", e)))?;

        let relative = entry
            .enclosed_name()
            .and_then(normalized_relative)
            .ok_or_else(|| {
                tracing::warn!("Rejected archive entry escaping workspace: {}", entry.name());
                AppError::ExtractionFailed(format!(
                    "Entry '{}' escapes the extraction directory",
                    entry.name()
                ))
            })?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = workspace.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            AppError::ExtractionFailed(format!("Failed to inflate '{}': {}", entry.name(), e))
        })?;
    }

    Ok(archive.len())
}

/// Lists the entries of a stored archive without extracting it.
///
/// Unreadable individual entries are skipped.
pub fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>, AppError> {
    if !archive_path.exists() {
        return Err(AppError::NotFound(archive_path.to_path_buf()));
    }

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| AppError::ExtractionFailed(format!("Failed to parse ZIP: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read ZIP entry: {}", e);
                continue;
            }
        };

        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            is_dir: entry.is_dir(),
        });
    }

    Ok(entries)
}

/// Packs `folder` into `{output_dir}/{folder_name}.zip`
pub fn pack_directory(folder: &Path, output_dir: &Path) -> Result<PathBuf, AppError> {
    if !folder.is_dir() {
        return Err(AppError::NotFound(folder.to_path_buf()));
    }

    let folder = std::path::absolute(folder)?;
    let output_dir = std::path::absolute(output_dir)?;
    if output_dir.starts_with(&folder) {
        return Err(AppError::InvalidRequest(
            "Bundle output directory cannot live inside the packed folder".to_string(),
        ));
    }

    let folder_name = folder
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::InvalidRequest("Folder has no usable name".to_string()))?;

    fs::create_dir_all(&output_dir)?;
    let zip_path = output_dir.join(format!("{}.zip", folder_name));

    let mut zip = ZipWriter::new(File::create(&zip_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(&folder).min_depth(1).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| AppError::Io(io::Error::other(e)))?;
        let relative = entry
            .path()
            .strip_prefix(&folder)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| AppError::Io(io::Error::other(e)))?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)
                .map_err(|e| AppError::Io(io::Error::other(e)))?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    zip.finish()
        .map_err(|e| AppError::Io(io::Error::other(e)))?;

    tracing::info!("ZIP file created successfully at: {}", zip_path.display());
    Ok(zip_path)
}

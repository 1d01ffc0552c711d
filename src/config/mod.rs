use std::env;
use std::path::{Path, PathBuf};

use crate::services::upload::ArtifactKind;

pub const EXTRACTED_DIR: &str = "extracted";
pub const MERGED_DIR: &str = "merged";
pub const PROCESSED_DIR: &str = "processed";
pub const BUNDLES_DIR: &str = "bundles";

/// Storage configuration for the ingest pipeline
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory every artifact lives under (default: "data")
    pub data_root: PathBuf,

    /// Maximum accepted upload size in bytes (default: 1000 MB)
    pub max_upload_size: usize,

    /// Size of the write buffer used while streaming uploads (default: 64 KB)
    pub write_buffer_size: usize,

    /// Default number of rows returned by CSV previews (default: 20)
    pub preview_row_limit: usize,

    /// Prefix stripped from the `audio` column before resolving clip folders
    pub audio_path_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            max_upload_size: 1000 * 1024 * 1024, // 1000 MB
            write_buffer_size: 64 * 1024,        // 64 KB
            preview_row_limit: 20,
            audio_path_prefix: "/data/local-files/?d=".to_string(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            data_root: env::var("DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.data_root),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            write_buffer_size: env::var("WRITE_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.write_buffer_size),

            preview_row_limit: env::var("PREVIEW_ROW_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.preview_row_limit),

            audio_path_prefix: env::var("AUDIO_PATH_PREFIX")
                .unwrap_or(default.audio_path_prefix),
        }
    }

    /// Create config for development (small buffers, data kept next to the binary)
    pub fn development() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            max_upload_size: 256 * 1024 * 1024,
            write_buffer_size: 8 * 1024,
            preview_row_limit: 50,
            ..Self::default()
        }
    }

    /// Default configuration with every artifact placed under `root`
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: root.into(),
            ..Self::default()
        }
    }

    pub fn upload_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.data_root.join(kind.root_dir_name())
    }

    pub fn extraction_dir(&self) -> PathBuf {
        self.data_root.join(EXTRACTED_DIR)
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.data_root.join(MERGED_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_root.join(PROCESSED_DIR)
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.data_root.join(BUNDLES_DIR)
    }

    /// Directories whose contents are derived from uploads and can be reset
    pub fn derived_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.extraction_dir(),
            self.merged_dir(),
            self.processed_dir(),
            self.bundles_dir(),
        ]
    }

    /// Every directory the service expects to exist at startup
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.upload_dir(ArtifactKind::Archive),
            self.upload_dir(ArtifactKind::Tabular),
        ];
        dirs.extend(self.derived_dirs());
        dirs
    }

    /// Render `path` relative to the data root when it lives inside it
    pub fn relative_to_root(&self, path: &Path) -> String {
        let root = std::path::absolute(&self.data_root).unwrap_or_else(|_| self.data_root.clone());
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        absolute
            .strip_prefix(&root)
            .unwrap_or(&absolute)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.max_upload_size, 1000 * 1024 * 1024);
        assert_eq!(config.data_root, PathBuf::from("data"));
        assert_eq!(config.audio_path_prefix, "/data/local-files/?d=");
    }

    #[test]
    fn test_development_config() {
        let config = StorageConfig::development();
        assert_eq!(config.data_root, PathBuf::from("data"));
        assert_eq!(config.max_upload_size, 256 * 1024 * 1024);
        assert_eq!(config.write_buffer_size, 8 * 1024);
        assert_eq!(config.preview_row_limit, 50);
        assert_eq!(
            config.audio_path_prefix,
            StorageConfig::default().audio_path_prefix
        );
    }

    #[test]
    fn test_upload_dirs_follow_kind() {
        let config = StorageConfig::rooted_at("/srv/ingest");
        assert_eq!(
            config.upload_dir(ArtifactKind::Archive),
            PathBuf::from("/srv/ingest/uploadedZip")
        );
        assert_eq!(
            config.upload_dir(ArtifactKind::Tabular),
            PathBuf::from("/srv/ingest/uploadedCSVs")
        );
        assert_eq!(config.all_dirs().len(), 6);
    }

    #[test]
    fn test_relative_to_root() {
        let config = StorageConfig::rooted_at("/srv/ingest");
        let path = PathBuf::from("/srv/ingest/uploadedZip/1-a.zip");
        assert_eq!(config.relative_to_root(&path), "uploadedZip/1-a.zip");

        let outside = PathBuf::from("/tmp/other.csv");
        assert_eq!(config.relative_to_root(&outside), "/tmp/other.csv");
    }
}

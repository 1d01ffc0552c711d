use crate::api::error::AppError;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReapOutcome {
    Removed,
    AlreadyAbsent,
}

/// Removes artifacts and workspaces on explicit request.
///
/// Deleting something that is already gone is a successful no-op, so callers
/// can safely retry a cleanup.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceReaper;

impl WorkspaceReaper {
    pub fn new() -> Self {
        Self
    }

    /// Removes `path`, recursively when it is a directory
    pub async fn reap(&self, path: &Path) -> Result<ReapOutcome, AppError> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Nothing to delete at {}", path.display());
                return Ok(ReapOutcome::AlreadyAbsent);
            }
            Err(source) => {
                return Err(AppError::DeleteFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Ok(()) => {
                tracing::info!("🗑️  Deleted {}", path.display());
                Ok(ReapOutcome::Removed)
            }
            // Lost a race with another cleanup
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ReapOutcome::AlreadyAbsent),
            Err(source) => Err(AppError::DeleteFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Removes every entry inside `dir` while keeping `dir` itself.
    ///
    /// Returns the number of entries removed.
    pub async fn clear_contents(&self, dir: &Path) -> Result<usize, AppError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(dir.to_path_buf()));
            }
            Err(source) => {
                return Err(AppError::DeleteFailed {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };

        let mut children: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| AppError::DeleteFailed {
                path: dir.to_path_buf(),
                source,
            })?
        {
            children.push(entry.path());
        }

        let mut removed = 0;
        for child in &children {
            if self.reap(child).await? == ReapOutcome::Removed {
                removed += 1;
            }
        }

        tracing::info!(
            "All contents of the folder '{}' have been deleted ({} entries)",
            dir.display(),
            removed
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reap_file_twice() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("1-a.zip");
        std::fs::write(&file, b"zip").unwrap();
        let reaper = WorkspaceReaper::new();

        assert_eq!(reaper.reap(&file).await.unwrap(), ReapOutcome::Removed);
        assert!(!file.exists());
        assert_eq!(
            reaper.reap(&file).await.unwrap(),
            ReapOutcome::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn test_reap_directory_tree() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("extracted_1");
        std::fs::create_dir_all(workspace.join("folder/nested")).unwrap();
        std::fs::write(workspace.join("folder/nested/x.txt"), b"x").unwrap();
        std::fs::write(workspace.join("y.txt"), b"y").unwrap();

        let outcome = WorkspaceReaper::new().reap(&workspace).await.unwrap();
        assert_eq!(outcome, ReapOutcome::Removed);
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_never_created_path_is_success() {
        let dir = TempDir::new().unwrap();
        let outcome = WorkspaceReaper::new()
            .reap(&dir.path().join("never/created"))
            .await
            .unwrap();
        assert_eq!(outcome, ReapOutcome::AlreadyAbsent);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_is_removed_not_followed() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("keep");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("data.csv"), b"id\n").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        WorkspaceReaper::new().reap(&link).await.unwrap();
        assert!(!link.exists());
        assert!(target.join("data.csv").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unremovable_path_reports_delete_failed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();

        // a path below a regular file fails with ENOTDIR, not NotFound
        let err = WorkspaceReaper::new()
            .reap(&file.join("child"))
            .await
            .unwrap_err();

        match err {
            AppError::DeleteFailed { path, .. } => assert_eq!(path, file.join("child")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_clear_contents_keeps_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("extracted");
        std::fs::create_dir_all(root.join("extracted_1/sub")).unwrap();
        std::fs::write(root.join("loose.txt"), b"x").unwrap();

        let reaper = WorkspaceReaper::new();
        assert_eq!(reaper.clear_contents(&root).await.unwrap(), 2);
        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);

        let err = reaper
            .clear_contents(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

use crate::config::StorageConfig;
use anyhow::Context;
use tracing::info;

/// Creates the data root layout before the server accepts requests
pub async fn setup_storage(config: &StorageConfig) -> anyhow::Result<()> {
    info!("💾 Data root: {}", config.data_root.display());

    for dir in config.all_dirs() {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        info!("✅ Directory '{}' is ready", dir.display());
    }

    Ok(())
}

/// True when every directory of the layout exists
pub async fn storage_ready(config: &StorageConfig) -> bool {
    for dir in config.all_dirs() {
        match tokio::fs::metadata(&dir).await {
            Ok(m) if m.is_dir() => {}
            _ => return false,
        }
    }
    true
}

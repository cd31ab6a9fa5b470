//! Builds the SyncManager every command runs against.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use shopsync_db::Database;
use shopsync_sync::{CentralLink, MemoryCentralLink, PgCentralLink, SyncConfig, SyncEventEmitter, SyncManager};
use tracing::info;

/// Loads config, opens the LocalStore and picks the central link.
pub async fn open(
    config_path: Option<PathBuf>,
    mock: bool,
    emitter: Arc<dyn SyncEventEmitter>,
) -> Result<SyncManager> {
    let config = SyncConfig::load(config_path).context("Failed to load configuration")?;

    let db_config = config.db_config()?;
    let db = Database::new(db_config.clone())
        .await
        .with_context(|| format!("Failed to open store database at {}", db_config.database_path.display()))?;

    let central: Arc<dyn CentralLink> = if mock {
        Arc::new(MemoryCentralLink::new())
    } else {
        Arc::new(PgCentralLink::from_config(&config.central).context("Invalid central database settings")?)
    };

    info!(store_id = config.store_id(), central = central.name(), "Sync engine ready");
    Ok(SyncManager::with_emitter(db, central, config, emitter))
}

/// In-memory store and central for command tests.
#[cfg(test)]
pub async fn test_manager() -> (SyncManager, Arc<MemoryCentralLink>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SyncConfig::default();
    config.sync.log_path = Some(dir.path().join("sync.log"));

    let db = Database::new(shopsync_db::DbConfig::in_memory()).await.unwrap();
    let central = Arc::new(MemoryCentralLink::new());
    (SyncManager::new(db, central.clone(), config), central, dir)
}

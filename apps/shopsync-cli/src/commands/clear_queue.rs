//! Discard every queued change.

use anyhow::{bail, Result};

use shopsync_sync::{SyncError, SyncManager};

/// Run the clear-queue command.
pub async fn run(manager: &SyncManager, yes: bool) -> Result<()> {
    match manager.clear_queue(yes.into()).await {
        Ok(removed) => {
            println!("Discarded {removed} queued change(s). Affected rows stay unsynced locally.");
            Ok(())
        }
        Err(SyncError::ConfirmationRequired) => {
            bail!("Refusing to clear the sync queue without --yes; queued changes would never reach central")
        }
        Err(SyncError::AlreadySyncing) => bail!("A sync cycle is running; try again when it finishes"),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_manager;
    use shopsync_db::{HybridDataAccess, RecordInput};

    #[tokio::test]
    async fn needs_yes() {
        let (manager, _central, _dir) = test_manager().await;
        let hda = HybridDataAccess::new(manager.database().clone(), manager.config().queue_limits());
        hda.write("categories", RecordInput::with_id(1).set("name", "Tea"))
            .await
            .unwrap();

        assert!(run(&manager, false).await.is_err());
        assert_eq!(manager.database().sync_queue().size().await.unwrap(), 1);

        run(&manager, true).await.unwrap();
        assert_eq!(manager.database().sync_queue().size().await.unwrap(), 0);
    }
}

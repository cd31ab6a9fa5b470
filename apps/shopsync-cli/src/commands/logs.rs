//! Show the tail of the sync log.

use anyhow::Result;

use shopsync_sync::SyncManager;

/// Run the logs command.
pub async fn run(manager: &SyncManager, lines: usize) -> Result<()> {
    let tail = manager.recent_logs(lines).await?;
    if tail.is_empty() {
        println!("(sync log is empty)");
    }
    for line in tail {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_manager;

    #[tokio::test]
    async fn logs_after_a_cycle() {
        let (manager, _central, _dir) = test_manager().await;
        run(&manager, 10).await.unwrap();

        manager.sync_now().await.unwrap();
        let tail = manager.recent_logs(10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].ends_with("Sync started (manual)"));
        assert!(run(&manager, 1).await.is_ok());
    }
}

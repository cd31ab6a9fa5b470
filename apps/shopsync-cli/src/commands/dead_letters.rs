//! List, retry or discard dead-lettered changes.

use anyhow::{bail, Result};
use chrono::Local;

use shopsync_sync::SyncManager;

/// List dead-lettered entries, oldest first.
pub async fn list(manager: &SyncManager, limit: u32) -> Result<()> {
    let entries = manager.dead_letters(limit).await?;
    if entries.is_empty() {
        println!("No dead-lettered changes.");
        return Ok(());
    }

    println!("{:>6}  {:<14} {:<38} {:>8}  {:<19}  last error", "seq", "table", "record", "attempts", "last attempt");
    for entry in &entries {
        let last_attempt = entry
            .last_attempt_at
            .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<14} {:<38} {:>8}  {:<19}  {}",
            entry.seq,
            entry.table,
            entry.record_id.to_string(),
            entry.attempts,
            last_attempt,
            entry.last_error.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}

/// Return every dead-lettered entry to the queue.
pub async fn retry(manager: &SyncManager) -> Result<()> {
    let revived = manager.retry_dead_letters().await?;
    println!("{revived} change(s) back in the queue; they go out with the next sync.");
    Ok(())
}

/// Drop one dead-lettered entry.
pub async fn discard(manager: &SyncManager, seq: i64) -> Result<()> {
    if !manager.discard_dead_letter(seq).await? {
        bail!("No dead-lettered change with seq {seq}");
    }
    println!("Discarded dead-lettered change {seq}.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_manager;
    use shopsync_db::{HybridDataAccess, RecordInput};

    #[tokio::test]
    async fn list_retry_discard() {
        let (manager, central, _dir) = test_manager().await;
        list(&manager, 10).await.unwrap();

        let hda = HybridDataAccess::new(manager.database().clone(), manager.config().queue_limits());
        hda.write("categories", RecordInput::with_id(1).set("name", "Tea"))
            .await
            .unwrap();
        central.reject_pushes_for("categories", 1).await;
        for _ in 0..manager.config().sync.max_attempts {
            manager.sync_now().await.unwrap();
        }

        let dead = manager.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        list(&manager, 10).await.unwrap();

        retry(&manager).await.unwrap();
        assert!(manager.dead_letters(10).await.unwrap().is_empty());

        for _ in 0..manager.config().sync.max_attempts {
            manager.sync_now().await.unwrap();
        }
        let seq = manager.dead_letters(10).await.unwrap()[0].seq;
        discard(&manager, seq).await.unwrap();
        assert!(discard(&manager, seq).await.is_err());
    }
}

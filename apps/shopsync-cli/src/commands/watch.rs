//! Run the auto-sync scheduler in the foreground.

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

use shopsync_core::{SyncPhase, SyncTrigger};
use shopsync_sync::{SyncEventEmitter, SyncManager, SyncScheduler};

/// Prints sync events as they happen.
pub struct ConsoleEmitter;

impl SyncEventEmitter for ConsoleEmitter {
    fn emit_status(&self, phase: SyncPhase, trigger: SyncTrigger) {
        let label = match phase {
            SyncPhase::Idle => "idle",
            SyncPhase::Pulling => "pulling",
            SyncPhase::Pushing => "pushing",
        };
        println!("[{}] {} ({})", Local::now().format("%H:%M:%S"), label, trigger.as_str());
    }

    fn emit_progress(&self, table: &str, pulled: u64, pushed: u64) {
        println!("[{}]   {table}: pulled {pulled}, pushed {pushed}", Local::now().format("%H:%M:%S"));
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        let kind = if retryable { "will retry" } else { "needs attention" };
        println!("[{}]   ! {message} ({kind})", Local::now().format("%H:%M:%S"));
    }
}

/// Run the watch command until Ctrl-C.
pub async fn run(manager: SyncManager, check_secs: u64) -> Result<()> {
    let interval = manager.config().sync.auto_sync_interval_secs;
    let manager = Arc::new(manager);
    let handle = SyncScheduler::spawn(manager, Duration::from_secs(check_secs.max(1)));

    println!("Watching (sync every {interval}s or past the queue threshold). Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping; waiting for any running cycle to finish...");
    handle.shutdown().await?;
    Ok(())
}

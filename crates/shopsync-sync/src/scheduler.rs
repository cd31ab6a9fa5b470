//! # Sync Scheduler
//!
//! Background task that asks the [`SyncManager`] whether a cycle is due.
//!
//! ```text
//!   every check_interval ──┐
//!   handle.nudge()       ──┼──► manager.auto_sync()
//!                          │      over threshold?    ─► Threshold cycle
//!                          │      interval elapsed?  ─► Scheduled cycle
//!                          │      lock held?         ─► skip quietly
//!   handle.shutdown()    ──┴──► loop exits after the current cycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::manager::SyncManager;

enum SchedulerCommand {
    Nudge,
    Shutdown,
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawns the loop on the current runtime.
    ///
    /// `check_interval` is how often triggers are evaluated, not the sync
    /// interval itself; that comes from the manager's configuration.
    pub fn spawn(manager: Arc<SyncManager>, check_interval: Duration) -> SchedulerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let task = tokio::spawn(Self::run(manager, check_interval, cmd_rx));
        SchedulerHandle { cmd_tx, task }
    }

    async fn run(manager: Arc<SyncManager>, check_interval: Duration, mut cmd_rx: mpsc::Receiver<SchedulerCommand>) {
        info!(check_ms = check_interval.as_millis() as u64, "Sync scheduler started");

        let mut ticker = interval(check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Nudge) => Self::tick(&manager).await,
                        Some(SchedulerCommand::Shutdown) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => Self::tick(&manager).await,
            }
        }
    }

    async fn tick(manager: &SyncManager) {
        match manager.auto_sync().await {
            Ok(Some(report)) => debug!(
                trigger = report.trigger.as_str(),
                outcome = report.outcome.as_str(),
                "Scheduled cycle done"
            ),
            Ok(None) => {}
            Err(e) => error!(error = %e, retryable = e.is_retryable(), "Automatic sync failed"),
        }
    }
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Evaluates triggers now instead of waiting for the next tick.
    pub async fn nudge(&self) -> SyncResult<()> {
        self.cmd_tx
            .send(SchedulerCommand::Nudge)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop and waits for an in-flight cycle to finish.
    pub async fn shutdown(self) -> SyncResult<()> {
        // A closed channel means the loop already exited
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown).await;
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("scheduler task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::MemoryCentralLink;
    use crate::config::SyncConfig;
    use shopsync_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_first_tick_runs_a_scheduled_cycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let manager = Arc::new(SyncManager::new(db, Arc::new(MemoryCentralLink::new()), SyncConfig::default()));

        let handle = SyncScheduler::spawn(manager.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(handle.is_running());
        handle.shutdown().await.unwrap();

        // Default interval is minutes long, so only the first tick synced
        let runs = manager.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].trigger, shopsync_core::SyncTrigger::Scheduled);
    }

    #[tokio::test]
    async fn test_nudge_after_shutdown_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = SyncConfig::default();
        config.sync.auto_sync_enabled = false;
        let manager = Arc::new(SyncManager::new(db, Arc::new(MemoryCentralLink::new()), config));

        let handle = SyncScheduler::spawn(manager, Duration::from_secs(60));
        handle.nudge().await.unwrap();

        let tx = handle.cmd_tx.clone();
        handle.shutdown().await.unwrap();
        assert!(tx.send(SchedulerCommand::Nudge).await.is_err());
    }
}

//! Run a sync cycle now.

use anyhow::{bail, Context, Result};

use shopsync_core::{RunOutcome, SyncReport};
use shopsync_sync::{SyncError, SyncManager};

/// Run the sync command.
pub async fn run(manager: &SyncManager) -> Result<()> {
    let report = match manager.sync_now().await {
        Ok(report) => report,
        Err(SyncError::AlreadySyncing) => bail!("Another sync cycle is running; try again shortly"),
        Err(e) => return Err(e).context("Sync failed"),
    };

    print_report(&report);

    if report.outcome == RunOutcome::Aborted {
        bail!(
            "Sync aborted: {}",
            report.abort_reason.as_deref().unwrap_or("central database unavailable")
        );
    }
    Ok(())
}

/// Prints a finished cycle for an operator.
pub fn print_report(report: &SyncReport) {
    println!("=== sync ({}) ===", report.trigger.as_str());
    println!("Outcome:       {}", report.outcome.as_str());
    println!("Pulled:        {}", report.pulled);
    println!("Pushed:        {}", report.pushed);
    println!("Skipped:       {}", report.skipped);
    println!("Dead-lettered: {}", report.dead_lettered);

    if let Some(finished) = report.finished_at {
        println!("Took:          {} ms", (finished - report.started_at).num_milliseconds());
    }

    if !report.per_table.is_empty() {
        println!();
        println!("{:<14} {:>7} {:>10} {:>7} {:>8} {:>7}", "table", "pulled", "kept-local", "pushed", "skipped", "failed");
        for (table, t) in &report.per_table {
            println!(
                "{:<14} {:>7} {:>10} {:>7} {:>8} {:>7}",
                table, t.pulled, t.kept_local, t.pushed, t.skipped, t.failed
            );
        }
    }

    if !report.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &report.issues {
            let subject = match (&issue.record_id, issue.seq) {
                (Some(id), Some(seq)) => format!("{}/{} (seq {})", issue.table, id, seq),
                (Some(id), None) => format!("{}/{}", issue.table, id),
                _ => issue.table.clone(),
            };
            println!("  {}: {}", subject, issue.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_manager;

    #[tokio::test]
    async fn sync_succeeds_when_central_is_up() {
        let (manager, _central, _dir) = test_manager().await;
        assert!(run(&manager).await.is_ok());
        assert_eq!(manager.recent_runs(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sync_fails_when_central_is_down() {
        let (manager, central, _dir) = test_manager().await;
        central.set_online(false);

        let err = run(&manager).await.unwrap_err();
        assert!(err.to_string().contains("aborted"));
    }
}

//! Run a sync cycle only if one is due.

use anyhow::Result;

use shopsync_sync::SyncManager;

use super::sync::print_report;

/// Run the auto command. A cycle that is not due is not an error.
pub async fn run(manager: &SyncManager) -> Result<()> {
    match manager.auto_sync().await? {
        Some(report) => print_report(&report),
        None => println!("No sync due (auto sync disabled, not due yet, or another cycle is running)."),
    }
    Ok(())
}

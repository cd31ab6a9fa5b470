//! Check that the central database is reachable.

use anyhow::{bail, Result};

use shopsync_sync::SyncManager;

/// Run the test-connection command.
pub async fn run(manager: &SyncManager) -> Result<()> {
    let health = manager.test_connection().await;
    if !health.reachable {
        bail!("Central database unreachable: {}", health.message);
    }

    println!("Central database reachable ({} ms)", health.latency_ms);
    Ok(())
}

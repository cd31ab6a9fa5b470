//! Show sync status.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use shopsync_core::SyncStatusSnapshot;
use shopsync_sync::SyncManager;

/// Run the stats command.
pub async fn run(manager: &SyncManager, json: bool) -> Result<()> {
    let snapshot = manager.status().await?;

    if json {
        let out = serde_json::to_string_pretty(&snapshot).context("Failed to encode status")?;
        println!("{out}");
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &SyncStatusSnapshot) {
    println!("=== shopsync status ===");
    println!();

    println!("Central:");
    if snapshot.central_connected {
        println!("  Status: CONNECTED");
    } else {
        println!("  Status: UNREACHABLE ({})", snapshot.central_message);
    }
    println!("  Mode:   {}", snapshot.mode.as_str().to_uppercase());
    println!();

    println!("Queue:");
    println!("  Pending:      {}", snapshot.queue_size);
    println!("  Dead letters: {}", snapshot.dead_letter_count);
    println!("  Last sync:    {}", format_time(snapshot.last_sync_time));
    println!();

    println!("{:<14} {:>8} {:>9} {:>8}", "table", "total", "unsynced", "synced");
    for (table, stats) in &snapshot.per_table {
        println!(
            "{:<14} {:>8} {:>9} {:>7.1}%",
            table, stats.total, stats.unsynced, stats.synced_percentage
        );
    }
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

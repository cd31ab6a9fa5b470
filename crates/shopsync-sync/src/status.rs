//! # Sync Status Reporter
//!
//! Builds a [`SyncStatusSnapshot`] on demand. Cost is bounded: one COUNT
//! pair per synchronizable table, two queue counts, one run lookup and a
//! single health probe capped by `status_probe_timeout`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shopsync_core::schema::SYNC_TABLES;
use shopsync_core::{clock, HealthReport, SyncMode, SyncStatusSnapshot, TableSyncStats};
use shopsync_db::Database;
use tracing::debug;

use crate::central::CentralLink;
use crate::error::SyncResult;

pub struct SyncStatusReporter {
    db: Database,
    central: Arc<dyn CentralLink>,
    probe_timeout: Duration,
}

impl SyncStatusReporter {
    pub fn new(db: Database, central: Arc<dyn CentralLink>, probe_timeout: Duration) -> Self {
        SyncStatusReporter {
            db,
            central,
            probe_timeout,
        }
    }

    /// Health probe that gives up after the probe timeout.
    pub async fn probe(&self) -> HealthReport {
        match tokio::time::timeout(self.probe_timeout, self.central.health_check()).await {
            Ok(report) => report,
            Err(_) => HealthReport::unreachable(format!(
                "health probe timed out after {}ms",
                self.probe_timeout.as_millis()
            )),
        }
    }

    pub async fn snapshot(&self) -> SyncResult<SyncStatusSnapshot> {
        let health = self.probe().await;

        let queue = self.db.sync_queue();
        let queue_size = queue.size().await?;
        let dead_letter_count = queue.dead_count().await?;

        let records = self.db.records();
        let mut per_table = BTreeMap::new();
        for schema in SYNC_TABLES {
            let total = records.count_total(schema).await?;
            let unsynced = records.count_unsynced(schema).await?;
            per_table.insert(schema.name.to_string(), TableSyncStats::new(total, unsynced));
        }

        let last_sync_time = self
            .db
            .sync_runs()
            .last_successful()
            .await?
            .and_then(|run| run.finished_at);

        let unsynced: u64 = per_table.values().map(|t| t.unsynced).sum();
        let mode = SyncMode::derive(health.reachable, queue_size, unsynced);
        debug!(mode = mode.as_str(), queue_size, unsynced, "Status snapshot computed");

        Ok(SyncStatusSnapshot {
            central_connected: health.reachable,
            central_message: health.message,
            mode,
            queue_size,
            dead_letter_count,
            last_sync_time,
            per_table,
            generated_at: clock::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::MemoryCentralLink;
    use shopsync_db::{DbConfig, HybridDataAccess, QueueLimits, RecordInput};

    async fn setup() -> (Database, Arc<MemoryCentralLink>, SyncStatusReporter) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let central = Arc::new(MemoryCentralLink::new());
        let reporter = SyncStatusReporter::new(db.clone(), central.clone(), Duration::from_millis(100));
        (db, central, reporter)
    }

    #[tokio::test]
    async fn test_empty_store_is_online() {
        let (_db, _central, reporter) = setup().await;
        let snapshot = reporter.snapshot().await.unwrap();

        assert!(snapshot.central_connected);
        assert_eq!(snapshot.mode, SyncMode::Online);
        assert_eq!(snapshot.queue_size, 0);
        assert_eq!(snapshot.per_table.len(), SYNC_TABLES.len());
        assert_eq!(snapshot.per_table["products"].synced_percentage, 100.0);
        assert!(snapshot.last_sync_time.is_none());
    }

    #[tokio::test]
    async fn test_pending_work_and_offline_modes() {
        let (db, central, reporter) = setup().await;
        let hda = HybridDataAccess::new(db, QueueLimits::default());
        hda.write("categories", RecordInput::with_id(1).set("name", "Drinks"))
            .await
            .unwrap();

        let snapshot = reporter.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SyncMode::Hybrid);
        assert_eq!(snapshot.queue_size, 1);
        assert_eq!(snapshot.per_table["categories"].unsynced, 1);
        assert_eq!(snapshot.per_table["categories"].synced_percentage, 0.0);

        central.set_online(false);
        let snapshot = reporter.snapshot().await.unwrap();
        assert_eq!(snapshot.mode, SyncMode::Offline);
        assert!(!snapshot.central_connected);
    }

    #[tokio::test]
    async fn test_slow_probe_counts_as_unreachable() {
        let (_db, central, reporter) = setup().await;
        central.set_latency(Duration::from_millis(500));

        let snapshot = reporter.snapshot().await.unwrap();
        assert!(!snapshot.central_connected);
        assert!(snapshot.central_message.contains("timed out"));
    }
}

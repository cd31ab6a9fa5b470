//! # Reconcile Repository
//!
//! The multi-table transactions of a sync cycle. Each method is one SQLite
//! transaction and never waits on the central database while it is open.
//!
//! ## Pull Apply
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    for record in batch (ascending updated_at, id):                      │
//! │      local absent          → INSERT, synced_at = now                   │
//! │      central strictly newer → UPDATE all fields, synced_at = now       │
//! │      local newer or equal  → untouched                                  │
//! │    UPSERT sync_checkpoints (table, last.updated_at, last.id)           │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push Acknowledge
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    DELETE FROM sync_queue WHERE seq = ?                                │
//! │    UPDATE <table> SET synced_at = now                                  │
//! │           WHERE id = ? AND updated_at = <snapshot updated_at>          │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use shopsync_core::lww::{self, Resolution};
use shopsync_core::schema::TableSchema;
use shopsync_core::{RecordId, SkipReason, StepOutcome, SyncCheckpoint, SyncableRecord};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::pool::begin_write;
use crate::repository::{checkpoint, queue, records};

#[derive(Debug, Clone)]
pub struct ReconcileRepository {
    pool: SqlitePool,
}

impl ReconcileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReconcileRepository { pool }
    }

    /// Applies validated pulled records and advances the table checkpoint
    /// to `checkpoint`, atomically. Returns one outcome per record.
    pub async fn apply_pulled_batch(
        &self,
        schema: &TableSchema,
        batch: &[SyncableRecord],
        checkpoint: &SyncCheckpoint,
        synced_at: DateTime<Utc>,
    ) -> DbResult<Vec<StepOutcome>> {
        let mut tx = begin_write(&self.pool).await?;
        let mut outcomes = Vec::with_capacity(batch.len());

        for central in batch {
            let mut incoming = central.clone();
            incoming.synced_at = Some(synced_at);

            let outcome = match records::fetch_in(&mut tx, schema, &central.id).await? {
                None => {
                    records::insert_in(&mut tx, schema, &incoming).await?;
                    StepOutcome::Applied
                }
                Some(local) => match lww::resolve(local.updated_at, central.updated_at) {
                    Resolution::TakeCentral => {
                        records::update_in(&mut tx, schema, &incoming).await?;
                        StepOutcome::Applied
                    }
                    Resolution::KeepLocal => StepOutcome::Skipped(SkipReason::LocalNewerOrEqual),
                },
            };

            debug!(table = schema.name, record_id = %central.id, ?outcome, "Pulled record");
            outcomes.push(outcome);
        }

        checkpoint::save_in(&mut tx, checkpoint).await?;
        tx.commit().await?;
        Ok(outcomes)
    }

    /// Completes a delivered queue entry.
    ///
    /// Returns whether the row was marked synced; false means a newer local
    /// write exists and stays pending under its own queue entry.
    pub async fn acknowledge_push(
        &self,
        schema: &TableSchema,
        seq: i64,
        record_id: &RecordId,
        snapshot_updated_at: DateTime<Utc>,
        synced_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut tx = begin_write(&self.pool).await?;
        queue::remove_in(&mut tx, seq).await?;
        let marked = records::mark_synced_in(&mut tx, schema, record_id, snapshot_updated_at, synced_at).await?;
        tx.commit().await?;
        Ok(marked)
    }
}

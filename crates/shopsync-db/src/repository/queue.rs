//! # Sync Queue Repository
//!
//! Durable FIFO of local mutations waiting to reach the central database.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL WRITE (HybridDataAccess::write)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  0. SELECT COUNT(*) FROM sync_queue   (capacity check)          │   │
//! │  │  1. INSERT / UPDATE <table> ... synced_at = NULL               │   │
//! │  │  2. INSERT INTO sync_queue (table_name, record_id, payload)    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC CYCLE (push phase)                              │   │
//! │  │                                                                 │   │
//! │  │  1. peek_batch_after(cursor, n)  WHERE status = 'pending'      │   │
//! │  │  2. For each entry, oldest seq first:                          │   │
//! │  │     a. delivered → DELETE entry + set synced_at (one tx)       │   │
//! │  │     b. data error → attempts += 1, last_error = ?              │   │
//! │  │     c. attempts ≥ max → status = 'dead'                        │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Entries are only ever removed after delivery, by an operator, or     │
//! │  by supersession; never dropped silently.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use shopsync_core::{clock, QueueEntry, QueueOperation, QueueStatus, SyncableRecord};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

const SELECT_ENTRY: &str = r#"
    SELECT seq, table_name, operation, record_id, payload, enqueued_at,
           attempts, last_error, last_attempt_at, status
    FROM sync_queue
"#;

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    seq: i64,
    table_name: String,
    operation: String,
    record_id: String,
    payload: String,
    enqueued_at: i64,
    attempts: i64,
    last_error: Option<String>,
    last_attempt_at: Option<i64>,
    status: String,
}

impl QueueRow {
    fn into_entry(self) -> DbResult<QueueEntry> {
        let corrupt = |msg: String| DbError::corrupt("sync_queue", format!("seq {}: {msg}", self.seq));

        let payload = SyncableRecord::from_payload(&self.payload).map_err(|e| corrupt(e.to_string()))?;
        if payload.id.to_string() != self.record_id {
            return Err(corrupt(format!(
                "payload id {} does not match record_id {}",
                payload.id, self.record_id
            )));
        }

        Ok(QueueEntry {
            seq: self.seq,
            operation: self
                .operation
                .parse::<QueueOperation>()
                .map_err(|e| corrupt(e.to_string()))?,
            status: self.status.parse::<QueueStatus>().map_err(|e| corrupt(e.to_string()))?,
            enqueued_at: clock::from_millis(self.enqueued_at).map_err(|e| corrupt(e.to_string()))?,
            last_attempt_at: self
                .last_attempt_at
                .map(clock::from_millis)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            record_id: payload.id.clone(),
            table: self.table_name,
            last_error: self.last_error,
            payload,
        })
    }
}

fn into_entries(rows: Vec<QueueRow>) -> DbResult<Vec<QueueEntry>> {
    rows.into_iter().map(QueueRow::into_entry).collect()
}

// =============================================================================
// Connection-Level Operations
// =============================================================================

/// Fails with `QueueFull` unless `incoming` more entries fit.
///
/// Capacity counts pending and dead-lettered entries alike: both still hold
/// unreplayed local changes.
pub async fn ensure_capacity_in(conn: &mut SqliteConnection, max_size: u64, incoming: u64) -> DbResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(&mut *conn)
        .await?;

    if (count as u64).saturating_add(incoming) > max_size {
        warn!(queued = count, max = max_size, "Sync queue full, rejecting write");
        return Err(DbError::QueueFull { max: max_size });
    }
    Ok(())
}

/// Appends a snapshot of `record`. Runs inside the caller's transaction.
pub async fn enqueue_in(
    conn: &mut SqliteConnection,
    max_size: u64,
    table: &str,
    operation: QueueOperation,
    record: &SyncableRecord,
    enqueued_at: DateTime<Utc>,
) -> DbResult<QueueEntry> {
    ensure_capacity_in(conn, max_size, 1).await?;

    let payload = record.to_payload()?;
    let result = sqlx::query(
        r#"
        INSERT INTO sync_queue (table_name, operation, record_id, payload, enqueued_at, status)
        VALUES (?1, ?2, ?3, ?4, ?5, 'pending')
        "#,
    )
    .bind(table)
    .bind(operation.as_str())
    .bind(record.id.to_string())
    .bind(&payload)
    .bind(clock::to_millis(enqueued_at))
    .execute(&mut *conn)
    .await?;

    let seq = result.last_insert_rowid();
    debug!(seq, table, record_id = %record.id, op = operation.as_str(), "Queued for sync");

    Ok(QueueEntry {
        seq,
        table: table.to_string(),
        operation,
        record_id: record.id.clone(),
        payload: record.clone(),
        enqueued_at,
        attempts: 0,
        last_error: None,
        last_attempt_at: None,
        status: QueueStatus::Pending,
    })
}

/// Deletes one entry. Returns false if it was already gone.
pub async fn remove_in(conn: &mut SqliteConnection, seq: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM sync_queue WHERE seq = ?1")
        .bind(seq)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Oldest pending entries, not removed.
    pub async fn peek_batch(&self, limit: u32) -> DbResult<Vec<QueueEntry>> {
        self.peek_batch_after(0, limit).await
    }

    /// Pending entries with `seq > after`, oldest first.
    ///
    /// The push drain walks the queue with this cursor so entries that stay
    /// pending after a failed attempt are not re-read in the same cycle.
    pub async fn peek_batch_after(&self, after: i64, limit: u32) -> DbResult<Vec<QueueEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE status = 'pending' AND seq > ?1 ORDER BY seq ASC LIMIT ?2");
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(after)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    pub async fn get(&self, seq: i64) -> DbResult<Option<QueueEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE seq = ?1");
        let row: Option<QueueRow> = sqlx::query_as(&sql).bind(seq).fetch_optional(&self.pool).await?;
        row.map(QueueRow::into_entry).transpose()
    }

    pub async fn remove(&self, seq: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        remove_in(&mut conn, seq).await
    }

    /// Pending depth.
    pub async fn size(&self) -> DbResult<u64> {
        self.count("SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'").await
    }

    pub async fn dead_count(&self) -> DbResult<u64> {
        self.count("SELECT COUNT(*) FROM sync_queue WHERE status = 'dead'").await
    }

    /// Pending plus dead; what capacity is measured against.
    pub async fn total(&self) -> DbResult<u64> {
        self.count("SELECT COUNT(*) FROM sync_queue").await
    }

    async fn count(&self, sql: &str) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Records a failed delivery attempt.
    ///
    /// The entry moves to `Dead` once `attempts` reaches `max_attempts`.
    /// Returns the entry's status after the update.
    pub async fn record_failure(&self, seq: i64, error: &str, max_attempts: u32) -> DbResult<QueueStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE sync_queue SET
                attempts = attempts + 1,
                last_error = ?2,
                last_attempt_at = ?3,
                status = CASE WHEN attempts + 1 >= ?4 THEN 'dead' ELSE status END
            WHERE seq = ?1
            RETURNING status
            "#,
        )
        .bind(seq)
        .bind(error)
        .bind(clock::to_millis(clock::now()))
        .bind(i64::from(max_attempts))
        .fetch_optional(&self.pool)
        .await?;

        let status = status
            .ok_or_else(|| DbError::not_found("Queue entry", seq.to_string()))?
            .parse::<QueueStatus>()?;

        if status == QueueStatus::Dead {
            warn!(seq, error, "Queue entry dead-lettered");
        }
        Ok(status)
    }

    /// Moves an entry straight to the dead-letter state.
    pub async fn dead_letter(&self, seq: i64, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                status = 'dead',
                last_error = ?2,
                last_attempt_at = ?3
            WHERE seq = ?1
            "#,
        )
        .bind(seq)
        .bind(error)
        .bind(clock::to_millis(clock::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Queue entry", seq.to_string()));
        }
        warn!(seq, error, "Queue entry dead-lettered");
        Ok(())
    }

    /// Dead-lettered entries, oldest first.
    pub async fn dead_letters(&self, limit: u32) -> DbResult<Vec<QueueEntry>> {
        let sql = format!("{SELECT_ENTRY} WHERE status = 'dead' ORDER BY seq ASC LIMIT ?1");
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    /// Returns every dead-lettered entry to the pending state with a fresh
    /// attempt budget. Entries keep their seq, so FIFO order is preserved.
    pub async fn retry_dead_letters(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE sync_queue SET status = 'pending', attempts = 0 WHERE status = 'dead'")
            .execute(&self.pool)
            .await?;
        info!(count = result.rows_affected(), "Dead letters returned to queue");
        Ok(result.rows_affected())
    }

    /// Permanently drops one dead-lettered entry.
    ///
    /// Pending entries cannot be discarded this way.
    pub async fn discard_dead_letter(&self, seq: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE seq = ?1 AND status = 'dead'")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            warn!(seq, "Dead letter discarded");
        }
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every entry, pending and dead. Administrative only.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sync_queue").execute(&self.pool).await?;
        warn!(count = result.rows_affected(), "Sync queue cleared");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

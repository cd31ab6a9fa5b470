//! # Sync Lock Repository
//!
//! Storage-level mutual exclusion for sync cycles.
//!
//! ```text
//!   try_acquire ──► row absent or expired? ──yes──► row written, holder = me
//!                                          └─no───► false (someone is syncing)
//!
//!   renew ──► UPDATE expires_at WHERE name = ? AND holder = me
//!                 └─ 0 rows ──► lease lost, holder must stop
//!
//!   release ──► DELETE WHERE name = ? AND holder = me
//! ```
//!
//! Living in the database (not in process memory) means two processes
//! sharing one store file also exclude each other. The lock is a lease: a
//! running holder renews it, and a crashed holder's lock lapses after its
//! TTL instead of blocking sync forever.

use std::time::Duration;

use chrono::{DateTime, Utc};
use shopsync_core::clock;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;

/// Current holder of a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncLockRepository {
    pool: SqlitePool,
}

impl SyncLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncLockRepository { pool }
    }

    /// Takes the lock if it is free or expired. Single statement, so two
    /// contenders can never both succeed.
    pub async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> DbResult<bool> {
        let now = clock::to_millis(clock::now());
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now.saturating_add(ttl_ms);

        let result = sqlx::query(
            r#"
            INSERT INTO sync_lock (name, holder, acquired_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE sync_lock.expires_at <= ?3
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() > 0;
        debug!(name, holder, acquired, "Lock acquisition attempted");
        Ok(acquired)
    }

    /// Extends the lease by `ttl` from now. False when `holder` no longer owns
    /// the lock, including when it expired and someone else took it.
    pub async fn renew(&self, name: &str, holder: &str, ttl: Duration) -> DbResult<bool> {
        let now = clock::to_millis(clock::now());
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let result = sqlx::query(
            "UPDATE sync_lock SET expires_at = ?1 WHERE name = ?2 AND holder = ?3 AND expires_at > ?4",
        )
        .bind(now.saturating_add(ttl_ms))
        .bind(name)
        .bind(holder)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let renewed = result.rows_affected() > 0;
        if !renewed {
            warn!(name, holder, "Lock lease lost before renewal");
        }
        Ok(renewed)
    }

    /// Releases the lock if `holder` still owns it.
    pub async fn release(&self, name: &str, holder: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_lock WHERE name = ?1 AND holder = ?2")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        let released = result.rows_affected() > 0;
        if !released {
            warn!(name, holder, "Lock was no longer held at release (expired and taken over?)");
        }
        Ok(released)
    }

    /// Unexpired holder, if any.
    pub async fn current(&self, name: &str) -> DbResult<Option<LockInfo>> {
        let row = sqlx::query(
            "SELECT holder, acquired_at, expires_at FROM sync_lock WHERE name = ?1 AND expires_at > ?2",
        )
        .bind(name)
        .bind(clock::to_millis(clock::now()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> DbResult<LockInfo> {
            Ok(LockInfo {
                holder: r.try_get("holder")?,
                acquired_at: clock::from_millis(r.try_get("acquired_at")?)?,
                expires_at: clock::from_millis(r.try_get("expires_at")?)?,
            })
        })
        .transpose()
    }
}

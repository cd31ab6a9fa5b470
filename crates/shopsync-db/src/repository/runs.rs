//! # Sync Run History
//!
//! One row per sync cycle. The latest completed or partial run supplies
//! `last_sync_time` for status snapshots and the interval check for
//! scheduled syncs.

use chrono::{DateTime, Utc};
use shopsync_core::{clock, RunOutcome, SyncReport, SyncTrigger};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};

/// A stored sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRunRecord {
    pub id: i64,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub pulled: u64,
    pub pushed: u64,
    pub errors: u64,
    pub message: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: i64,
    trigger_kind: String,
    started_at: i64,
    finished_at: Option<i64>,
    outcome: Option<String>,
    pulled: i64,
    pushed: i64,
    errors: i64,
    message: Option<String>,
}

impl RunRow {
    fn into_record(self) -> DbResult<SyncRunRecord> {
        let corrupt = |e: shopsync_core::CoreError| DbError::corrupt("sync_runs", e.to_string());
        Ok(SyncRunRecord {
            id: self.id,
            trigger: self.trigger_kind.parse::<SyncTrigger>().map_err(corrupt)?,
            started_at: clock::from_millis(self.started_at).map_err(corrupt)?,
            finished_at: self.finished_at.map(clock::from_millis).transpose().map_err(corrupt)?,
            outcome: self
                .outcome
                .as_deref()
                .map(str::parse::<RunOutcome>)
                .transpose()
                .map_err(corrupt)?,
            pulled: self.pulled.max(0) as u64,
            pushed: self.pushed.max(0) as u64,
            errors: self.errors.max(0) as u64,
            message: self.message,
        })
    }
}

const SELECT_RUN: &str = r#"
    SELECT id, trigger_kind, started_at, finished_at, outcome, pulled, pushed, errors, message
    FROM sync_runs
"#;

#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

impl SyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncRunRepository { pool }
    }

    /// Opens a run row and returns its id.
    pub async fn start(&self, trigger: SyncTrigger, started_at: DateTime<Utc>) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO sync_runs (trigger_kind, started_at) VALUES (?1, ?2)")
            .bind(trigger.as_str())
            .bind(clock::to_millis(started_at))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Closes a run with the figures from its report.
    pub async fn finish(&self, id: i64, report: &SyncReport) -> DbResult<()> {
        let finished_at = report.finished_at.unwrap_or_else(clock::now);
        let errors = report.issues.len() as i64 + i64::from(report.is_aborted());

        sqlx::query(
            r#"
            UPDATE sync_runs SET
                finished_at = ?2,
                outcome = ?3,
                pulled = ?4,
                pushed = ?5,
                errors = ?6,
                message = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(clock::to_millis(finished_at))
        .bind(report.outcome.as_str())
        .bind(report.pulled as i64)
        .bind(report.pushed as i64)
        .bind(errors)
        .bind(report.summary())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent run that reached the end (completed or partial).
    pub async fn last_successful(&self) -> DbResult<Option<SyncRunRecord>> {
        let sql = format!(
            "{SELECT_RUN} WHERE outcome IN ('completed', 'partial') ORDER BY finished_at DESC, id DESC LIMIT 1"
        );
        let row: Option<RunRow> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        row.map(RunRow::into_record).transpose()
    }

    /// Most recent run of any outcome, finished or not.
    pub async fn last_started(&self) -> DbResult<Option<SyncRunRecord>> {
        let sql = format!("{SELECT_RUN} ORDER BY started_at DESC, id DESC LIMIT 1");
        let row: Option<RunRow> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        row.map(RunRow::into_record).transpose()
    }

    /// Newest first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<SyncRunRecord>> {
        let sql = format!("{SELECT_RUN} ORDER BY id DESC LIMIT ?1");
        let rows: Vec<RunRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RunRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_last_successful_ignores_aborted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let runs = db.sync_runs();
        assert!(runs.last_successful().await.unwrap().is_none());

        let t0 = clock::from_millis(1_000).unwrap();
        let id = runs.start(SyncTrigger::Manual, t0).await.unwrap();
        let mut report = SyncReport::new(SyncTrigger::Manual, t0);
        report.pulled = 4;
        report.finish(clock::from_millis(2_000).unwrap());
        runs.finish(id, &report).await.unwrap();

        let t1 = clock::from_millis(3_000).unwrap();
        let id = runs.start(SyncTrigger::Scheduled, t1).await.unwrap();
        let mut report = SyncReport::new(SyncTrigger::Scheduled, t1);
        report.abort("central unavailable");
        report.finish(clock::from_millis(4_000).unwrap());
        runs.finish(id, &report).await.unwrap();

        let last = runs.last_successful().await.unwrap().unwrap();
        assert_eq!(last.outcome, Some(RunOutcome::Completed));
        assert_eq!(last.pulled, 4);
        assert_eq!(last.finished_at, Some(clock::from_millis(2_000).unwrap()));

        let started = runs.last_started().await.unwrap().unwrap();
        assert_eq!(started.trigger, SyncTrigger::Scheduled);
        assert_eq!(started.errors, 1);

        assert_eq!(runs.recent(10).await.unwrap().len(), 2);
    }
}

//! # Sync Manager
//!
//! Runs sync cycles between the LocalStore and the central database.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          One Sync Cycle                                 │
//! │                                                                         │
//! │  trigger (manual / scheduled / threshold)                              │
//! │     │                                                                   │
//! │     ▼  sync_lock row free?  ──no──► manual: AlreadySyncing              │
//! │     │                               automatic: Ok(None)                 │
//! │     ▼                                                                   │
//! │  connect (bounded) ──unavailable──► abort, nothing changed              │
//! │     │                                                                   │
//! │     ▼  PULLING, per table in registry order                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ checkpoint ─► pull_since ─► validate ─► apply batch + advance   │   │
//! │  │ checkpoint in ONE local tx ─► repeat until a short batch        │   │
//! │  │ malformed record / local failure: stop this table, keep prefix  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │     │                                                                   │
//! │     ▼  PUSHING, queue FIFO by seq                                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ snapshot older than local row ─► drop entry (superseded)        │   │
//! │  │ push ─► Applied      ─► remove entry + synced_at (one tx)       │   │
//! │  │      ─► CentralNewer ─► remove entry, next pull brings it       │   │
//! │  │      ─► Data error   ─► attempts+1, dead-letter at max_attempts │   │
//! │  │      ─► Unavailable  ─► abort, rest of queue untouched          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │     │                                                                   │
//! │     ▼  IDLE: release lock, record run, append sync log                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No local transaction is open while a central call is in flight. The lock
//! is a lease renewed before every central call; a cycle that finds its
//! lease gone aborts without calling central again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shopsync_core::lww;
use shopsync_core::schema::{self, TableSchema, SYNC_TABLES};
use shopsync_core::{
    clock, HealthReport, QueueEntry, QueueStatus, SkipReason, StepOutcome, SyncCheckpoint, SyncPhase, SyncReport,
    SyncStatusSnapshot, SyncTrigger, SYNC_LOCK_NAME,
};
use shopsync_db::{Database, SyncRunRecord};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::central::{CentralError, CentralLink, CentralResult, PushAck};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{NoOpEmitter, SyncEventEmitter};
use crate::log::SyncLog;
use crate::status::SyncStatusReporter;

/// Explicit go-ahead for destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    NotConfirmed,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::NotConfirmed
        }
    }
}

// =============================================================================
// Sync Manager
// =============================================================================

pub struct SyncManager {
    db: Database,
    central: Arc<dyn CentralLink>,
    config: Arc<SyncConfig>,
    reporter: SyncStatusReporter,
    log: SyncLog,
    emitter: Arc<dyn SyncEventEmitter>,
    /// Lock holder id, unique per manager instance.
    holder: String,
    phase: RwLock<SyncPhase>,
}

impl SyncManager {
    pub fn new(db: Database, central: Arc<dyn CentralLink>, config: SyncConfig) -> Self {
        Self::with_emitter(db, central, config, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        db: Database,
        central: Arc<dyn CentralLink>,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let reporter = SyncStatusReporter::new(db.clone(), central.clone(), config.central.status_probe_timeout());
        let log = SyncLog::new(config.sync.log_path.clone());
        let holder = format!("{}:{}", config.store.id, Uuid::new_v4());

        SyncManager {
            db,
            central,
            config: Arc::new(config),
            reporter,
            log,
            emitter,
            holder,
            phase: RwLock::new(SyncPhase::Idle),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn phase(&self) -> SyncPhase {
        *self.phase.read().await
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// Runs a cycle now. Fails with `AlreadySyncing` if one is running.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        self.run_cycle(SyncTrigger::Manual)
            .await?
            .ok_or(SyncError::AlreadySyncing)
    }

    /// Runs a cycle if one is due. `Ok(None)` when nothing ran.
    pub async fn auto_sync(&self) -> SyncResult<Option<SyncReport>> {
        if !self.config.sync.auto_sync_enabled {
            debug!("Auto sync disabled");
            return Ok(None);
        }
        match self.due_trigger().await? {
            Some(trigger) => self.run_cycle(trigger).await,
            None => Ok(None),
        }
    }

    /// Which automatic trigger applies right now, if any.
    ///
    /// The threshold fires once the pending queue exceeds it and wins over
    /// the interval; a threshold of 0 is off.
    pub async fn due_trigger(&self) -> SyncResult<Option<SyncTrigger>> {
        let threshold = self.config.sync.queue_threshold;
        if threshold > 0 && self.db.sync_queue().size().await? > threshold {
            return Ok(Some(SyncTrigger::Threshold));
        }

        let interval_ms = i64::try_from(self.config.auto_sync_interval().as_millis()).unwrap_or(i64::MAX);
        let due = match self.db.sync_runs().last_started().await? {
            None => true,
            Some(run) => {
                let elapsed = clock::to_millis(clock::now()) - clock::to_millis(run.started_at);
                elapsed >= interval_ms
            }
        };
        Ok(due.then_some(SyncTrigger::Scheduled))
    }

    async fn run_cycle(&self, trigger: SyncTrigger) -> SyncResult<Option<SyncReport>> {
        let lock = self.db.sync_lock();
        if !lock
            .try_acquire(SYNC_LOCK_NAME, &self.holder, self.config.lock_ttl())
            .await?
        {
            info!(trigger = trigger.as_str(), "Sync lock held, skipping cycle");
            if !trigger.is_automatic() {
                self.note("Manual sync refused: another cycle is running").await;
            }
            return Ok(None);
        }

        let result = self.run_locked(trigger).await;

        self.set_phase(SyncPhase::Idle, trigger).await;
        if let Err(e) = lock.release(SYNC_LOCK_NAME, &self.holder).await {
            error!(error = %e, "Failed to release sync lock; it will expire after its TTL");
        }

        result.map(Some)
    }

    async fn run_locked(&self, trigger: SyncTrigger) -> SyncResult<SyncReport> {
        let started_at = clock::now();
        let run_id = self.db.sync_runs().start(trigger, started_at).await?;
        let mut report = SyncReport::new(trigger, started_at);

        info!(trigger = trigger.as_str(), run_id, central = self.central.name(), "Sync cycle started");
        self.note(&format!("Sync started ({})", trigger.as_str())).await;

        let connect_timeout = self.config.central.connect_timeout();
        match self
            .call_central(connect_timeout, self.central.connect(connect_timeout))
            .await
        {
            Err(e) => self.abort(&mut report, e),
            Ok(()) => {
                self.set_phase(SyncPhase::Pulling, trigger).await;
                self.pull_all(&mut report).await;

                if !report.is_aborted() {
                    self.set_phase(SyncPhase::Pushing, trigger).await;
                    self.push_all(&mut report).await;
                }
            }
        }

        report.finish(clock::now());
        if let Err(e) = self.db.sync_runs().finish(run_id, &report).await {
            error!(run_id, error = %e, "Failed to record sync run");
        }

        info!(
            trigger = trigger.as_str(),
            outcome = report.outcome.as_str(),
            pulled = report.pulled,
            pushed = report.pushed,
            skipped = report.skipped,
            dead_lettered = report.dead_lettered,
            issues = report.issues.len(),
            "Sync cycle finished"
        );
        self.note(&report.summary()).await;

        Ok(report)
    }

    // =========================================================================
    // Pull
    // =========================================================================

    async fn pull_all(&self, report: &mut SyncReport) {
        for schema in SYNC_TABLES {
            if let Err(e) = self.pull_table(schema, report).await {
                self.abort(report, e);
            }
            if report.is_aborted() {
                return;
            }
        }
    }

    /// Pulls one table. Only an unavailable central is returned as an error.
    async fn pull_table(&self, schema: &TableSchema, report: &mut SyncReport) -> CentralResult<()> {
        let limit = self.config.sync.pull_batch_size;
        let mut checkpoint = match self.db.checkpoints().load(schema.name).await {
            Ok(cp) => cp,
            Err(e) => {
                self.issue(report, schema.name, None, None, format!("checkpoint load failed: {e}"))
                    .await;
                return Ok(());
            }
        };

        loop {
            if !self.keep_lock(report).await {
                return Ok(());
            }
            let pulled = self
                .call_central(
                    self.config.central.request_timeout(),
                    self.central.pull_since(schema, &checkpoint, limit),
                )
                .await;
            let batch = match pulled {
                Ok(batch) => batch,
                Err(CentralError::Data(msg)) => {
                    self.issue(report, schema.name, None, None, format!("pull failed: {msg}"))
                        .await;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let fetched = batch.len();
            let mut valid = Vec::with_capacity(fetched);
            let mut malformed = None;
            for record in batch {
                if !checkpoint.is_before(&record) {
                    debug!(table = schema.name, record_id = %record.id, "Ignoring record at or before checkpoint");
                    continue;
                }
                match schema.validate_record(&record) {
                    Ok(normalized) => valid.push(normalized),
                    Err(e) => {
                        malformed = Some((record.id, e));
                        break;
                    }
                }
            }

            if let Some(last) = valid.last() {
                let next = SyncCheckpoint::after(schema.name, last);
                match self
                    .db
                    .reconcile()
                    .apply_pulled_batch(schema, &valid, &next, clock::now())
                    .await
                {
                    Ok(outcomes) => {
                        for outcome in &outcomes {
                            report.record_pull(schema.name, outcome);
                        }
                        checkpoint = next;
                    }
                    Err(e) => {
                        self.issue(report, schema.name, None, None, format!("local apply failed: {e}"))
                            .await;
                        return Ok(());
                    }
                }

                let table = report.table_mut(schema.name);
                self.emitter.emit_progress(schema.name, table.pulled, table.pushed);
            }

            if let Some((record_id, err)) = malformed {
                let message = format!("malformed record: {err}");
                report.record_pull(schema.name, &StepOutcome::Failed(message.clone()));
                self.issue(report, schema.name, Some(record_id.to_string()), None, message)
                    .await;
                return Ok(());
            }

            if fetched < limit as usize || valid.is_empty() {
                break;
            }
        }

        let table = report.table_mut(schema.name);
        let (pulled, kept_local) = (table.pulled, table.kept_local);
        debug!(table = schema.name, pulled, kept_local, "Table pulled");
        if pulled + kept_local > 0 {
            self.note(&format!("Pulled {}: {pulled} applied, {kept_local} kept local", schema.name))
                .await;
        }
        Ok(())
    }

    // =========================================================================
    // Push
    // =========================================================================

    async fn push_all(&self, report: &mut SyncReport) {
        let batch_size = self.config.sync.batch_size;
        let mut cursor = 0;

        loop {
            let batch = match self.db.sync_queue().peek_batch_after(cursor, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    self.issue(report, "sync_queue", None, None, format!("queue read failed: {e}"))
                        .await;
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            for entry in batch {
                if !self.keep_lock(report).await {
                    return;
                }
                cursor = entry.seq;
                match self.push_entry(&entry, report).await {
                    Ok(()) => {}
                    Err(SyncError::CentralUnavailable(msg)) => {
                        self.abort(report, CentralError::Unavailable(msg));
                        return;
                    }
                    Err(e) => {
                        self.issue(
                            report,
                            &entry.table,
                            Some(entry.record_id.to_string()),
                            Some(entry.seq),
                            format!("local failure while pushing: {e}"),
                        )
                        .await;
                        return;
                    }
                }
            }
        }
    }

    async fn push_entry(&self, entry: &QueueEntry, report: &mut SyncReport) -> SyncResult<()> {
        let queue = self.db.sync_queue();

        let Some(schema) = schema::table(&entry.table) else {
            let message = format!("unknown table '{}'", entry.table);
            queue.dead_letter(entry.seq, &message).await?;
            report.record_push(&entry.table, &StepOutcome::Failed(message.clone()));
            report.dead_lettered += 1;
            self.issue(report, &entry.table, Some(entry.record_id.to_string()), Some(entry.seq), message)
                .await;
            return Ok(());
        };

        if let Some(current) = self.db.records().get(schema, &entry.record_id).await? {
            if lww::is_superseded(entry.payload.updated_at, current.updated_at) {
                queue.remove(entry.seq).await?;
                report.record_push(schema.name, &StepOutcome::Skipped(SkipReason::Superseded));
                debug!(seq = entry.seq, table = schema.name, record_id = %entry.record_id, "Superseded entry dropped");
                return Ok(());
            }
        }

        let pushed = self
            .call_central(
                self.config.central.request_timeout(),
                self.central.push(schema, &entry.payload),
            )
            .await;

        match pushed {
            Ok(PushAck::Applied) => {
                let marked = self
                    .db
                    .reconcile()
                    .acknowledge_push(schema, entry.seq, &entry.record_id, entry.payload.updated_at, clock::now())
                    .await?;
                report.record_push(schema.name, &StepOutcome::Applied);
                debug!(seq = entry.seq, table = schema.name, record_id = %entry.record_id, marked, "Pushed");
            }
            Ok(PushAck::CentralNewer) => {
                queue.remove(entry.seq).await?;
                report.record_push(schema.name, &StepOutcome::Skipped(SkipReason::CentralNewer));
                info!(
                    seq = entry.seq,
                    table = schema.name,
                    record_id = %entry.record_id,
                    "Central holds a newer version; local copy stays unsynced until the next pull"
                );
            }
            Err(CentralError::Unavailable(msg)) => return Err(SyncError::CentralUnavailable(msg)),
            Err(CentralError::Data(msg)) => {
                let status = queue
                    .record_failure(entry.seq, &msg, self.config.sync.max_attempts)
                    .await?;
                report.record_push(schema.name, &StepOutcome::Failed(msg.clone()));

                let message = if status == QueueStatus::Dead {
                    report.dead_lettered += 1;
                    format!("dead-lettered after {} attempts: {msg}", entry.attempts + 1)
                } else {
                    format!("push failed (attempt {}): {msg}", entry.attempts + 1)
                };
                self.issue(report, schema.name, Some(entry.record_id.to_string()), Some(entry.seq), message)
                    .await;
            }
        }

        let table = report.table_mut(schema.name);
        self.emitter.emit_progress(schema.name, table.pulled, table.pushed);
        Ok(())
    }

    // =========================================================================
    // Status & Administration
    // =========================================================================

    pub async fn status(&self) -> SyncResult<SyncStatusSnapshot> {
        self.reporter.snapshot().await
    }

    /// Connects (bounded) and probes central. Never errors.
    pub async fn test_connection(&self) -> HealthReport {
        let timeout = self.config.central.connect_timeout();
        if let Err(e) = self.call_central(timeout, self.central.connect(timeout)).await {
            return HealthReport::unreachable(e.to_string());
        }
        self.reporter.probe().await
    }

    /// Discards every queue entry, pending and dead. Destructive.
    pub async fn clear_queue(&self, confirmation: Confirmation) -> SyncResult<u64> {
        if confirmation != Confirmation::Confirmed {
            return Err(SyncError::ConfirmationRequired);
        }

        let lock = self.db.sync_lock();
        if !lock
            .try_acquire(SYNC_LOCK_NAME, &self.holder, self.config.lock_ttl())
            .await?
        {
            return Err(SyncError::AlreadySyncing);
        }
        let cleared = self.db.sync_queue().clear().await;
        if let Err(e) = lock.release(SYNC_LOCK_NAME, &self.holder).await {
            error!(error = %e, "Failed to release sync lock after clearing queue");
        }

        let removed = cleared?;
        warn!(removed, "Sync queue cleared by operator");
        self.note(&format!("Queue cleared by operator: {removed} entries discarded"))
            .await;
        Ok(removed)
    }

    pub async fn dead_letters(&self, limit: u32) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.db.sync_queue().dead_letters(limit).await?)
    }

    /// Returns every dead-lettered entry to the pending queue.
    pub async fn retry_dead_letters(&self) -> SyncResult<u64> {
        let revived = self.db.sync_queue().retry_dead_letters().await?;
        if revived > 0 {
            info!(revived, "Dead-lettered entries returned to the queue");
            self.note(&format!("Dead letters retried: {revived} entries back in the queue"))
                .await;
        }
        Ok(revived)
    }

    pub async fn discard_dead_letter(&self, seq: i64) -> SyncResult<bool> {
        let discarded = self.db.sync_queue().discard_dead_letter(seq).await?;
        if discarded {
            warn!(seq, "Dead-lettered entry discarded by operator");
            self.note(&format!("Dead letter {seq} discarded by operator")).await;
        }
        Ok(discarded)
    }

    pub async fn recent_logs(&self, lines: usize) -> SyncResult<Vec<String>> {
        self.log.tail(lines).await
    }

    pub async fn recent_runs(&self, limit: u32) -> SyncResult<Vec<SyncRunRecord>> {
        Ok(self.db.sync_runs().recent(limit).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Bounds a central call; running out of time counts as unavailable.
    async fn call_central<T>(
        &self,
        limit: Duration,
        call: impl Future<Output = CentralResult<T>>,
    ) -> CentralResult<T> {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CentralError::Unavailable(format!(
                "central call timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }

    /// Renews the cycle's lease before the next central call. Aborts the
    /// cycle and returns false once the lease is gone.
    async fn keep_lock(&self, report: &mut SyncReport) -> bool {
        let renewed = self
            .db
            .sync_lock()
            .renew(SYNC_LOCK_NAME, &self.holder, self.config.lock_ttl())
            .await;
        let reason = match renewed {
            Ok(true) => return true,
            Ok(false) => "sync lock lost: lease expired or taken by another cycle".to_string(),
            Err(e) => format!("sync lock lost: renewal failed: {e}"),
        };

        self.issue(report, "sync_lock", None, None, reason.clone()).await;
        warn!(holder = %self.holder, "Sync cycle aborted, lock no longer held");
        report.abort(reason);
        false
    }

    async fn set_phase(&self, phase: SyncPhase, trigger: SyncTrigger) {
        *self.phase.write().await = phase;
        self.emitter.emit_status(phase, trigger);
    }

    fn abort(&self, report: &mut SyncReport, err: CentralError) {
        let retryable = err.is_unavailable();
        let reason = err.to_string();
        warn!(reason = %reason, "Sync cycle aborted");
        self.emitter.emit_error(&reason, retryable);
        report.abort(reason);
    }

    async fn issue(
        &self,
        report: &mut SyncReport,
        table: &str,
        record_id: Option<String>,
        seq: Option<i64>,
        message: String,
    ) {
        warn!(table, record_id = ?record_id, seq = ?seq, message = %message, "Sync issue");
        self.emitter.emit_error(&message, false);

        let subject = match (&record_id, seq) {
            (Some(id), Some(seq)) => format!("{table}/{id} (seq {seq})"),
            (Some(id), None) => format!("{table}/{id}"),
            _ => table.to_string(),
        };
        self.note(&format!("{subject}: {message}")).await;
        report.add_issue(table, record_id, seq, message);
    }

    /// Appends to the sync log; a failing log never fails a cycle.
    async fn note(&self, message: &str) {
        if let Err(e) = self.log.append(message).await {
            warn!(error = %e, "Failed to write sync log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::MemoryCentralLink;
    use shopsync_db::{DbConfig, HybridDataAccess, RecordInput};

    async fn manager(config: SyncConfig) -> SyncManager {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        SyncManager::new(db, Arc::new(MemoryCentralLink::new()), config)
    }

    #[tokio::test]
    async fn test_due_trigger_rules() {
        let mut config = SyncConfig::default();
        config.sync.queue_threshold = 2;
        config.sync.auto_sync_interval_secs = 3_600;
        let manager = manager(config).await;

        // Never synced: the interval has trivially elapsed
        assert_eq!(manager.due_trigger().await.unwrap(), Some(SyncTrigger::Scheduled));

        manager.sync_now().await.unwrap();
        assert_eq!(manager.due_trigger().await.unwrap(), None);
        assert!(manager.auto_sync().await.unwrap().is_none());

        let hda = HybridDataAccess::new(manager.database().clone(), manager.config().queue_limits());
        for id in 1..=2 {
            hda.write("categories", RecordInput::with_id(id).set("name", "c"))
                .await
                .unwrap();
        }
        // At the threshold is not over it
        assert_eq!(manager.due_trigger().await.unwrap(), None);

        hda.write("categories", RecordInput::with_id(3).set("name", "c"))
            .await
            .unwrap();
        assert_eq!(manager.due_trigger().await.unwrap(), Some(SyncTrigger::Threshold));

        let report = manager.auto_sync().await.unwrap().unwrap();
        assert_eq!(report.trigger, SyncTrigger::Threshold);
        assert_eq!(report.pushed, 3);
    }

    #[tokio::test]
    async fn test_auto_sync_disabled() {
        let mut config = SyncConfig::default();
        config.sync.auto_sync_enabled = false;
        let manager = manager(config).await;
        assert!(manager.auto_sync().await.unwrap().is_none());
        assert!(manager.recent_runs(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_queue_needs_confirmation() {
        let manager = manager(SyncConfig::default()).await;
        let hda = HybridDataAccess::new(manager.database().clone(), manager.config().queue_limits());
        hda.write("categories", RecordInput::with_id(1).set("name", "c"))
            .await
            .unwrap();

        let err = manager.clear_queue(false.into()).await.unwrap_err();
        assert!(matches!(err, SyncError::ConfirmationRequired));
        assert_eq!(manager.database().sync_queue().size().await.unwrap(), 1);

        assert_eq!(manager.clear_queue(Confirmation::Confirmed).await.unwrap(), 1);
        assert_eq!(manager.database().sync_queue().size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle() {
        let manager = manager(SyncConfig::default()).await;
        manager.sync_now().await.unwrap();
        assert_eq!(manager.phase().await, SyncPhase::Idle);
        assert!(manager.database().sync_lock().current(SYNC_LOCK_NAME).await.unwrap().is_none());
    }
}

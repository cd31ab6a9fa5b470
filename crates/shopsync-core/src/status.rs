//! # Status & Report DTOs
//!
//! Read-only summaries handed to operators and dashboards. Nothing here is
//! persisted; snapshots are recomputed on every request.
//!
//! ## Mode Rule
//! ```text
//! ┌──────────────────────┬──────────────────────────────┬──────────┐
//! │ central reachable?   │ queue empty & 0 unsynced?    │ mode     │
//! ├──────────────────────┼──────────────────────────────┼──────────┤
//! │ no                   │ (any)                        │ offline  │
//! │ yes                  │ yes                          │ online   │
//! │ yes                  │ no                           │ hybrid   │
//! └──────────────────────┴──────────────────────────────┴──────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{RunOutcome, SyncTrigger};

// =============================================================================
// Health
// =============================================================================

/// Result of a central health probe. Probes never fail; they report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthReport {
    pub reachable: bool,
    pub message: String,
    pub latency_ms: u64,
}

impl HealthReport {
    pub fn reachable(latency_ms: u64) -> Self {
        Self {
            reachable: true,
            message: "ok".to_string(),
            latency_ms,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            reachable: false,
            message: message.into(),
            latency_ms: 0,
        }
    }
}

// =============================================================================
// Status Snapshot
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Online,
    Offline,
    Hybrid,
}

impl SyncMode {
    pub fn derive(central_connected: bool, queue_size: u64, unsynced: u64) -> Self {
        if !central_connected {
            SyncMode::Offline
        } else if queue_size == 0 && unsynced == 0 {
            SyncMode::Online
        } else {
            SyncMode::Hybrid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Online => "online",
            SyncMode::Offline => "offline",
            SyncMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TableSyncStats {
    pub total: u64,
    pub unsynced: u64,
    /// `100 * (total - unsynced) / total`; 100 for an empty table.
    pub synced_percentage: f64,
}

impl TableSyncStats {
    pub fn new(total: u64, unsynced: u64) -> Self {
        let synced_percentage = if total == 0 {
            100.0
        } else {
            let synced = total.saturating_sub(unsynced) as f64;
            (synced * 10_000.0 / total as f64).round() / 100.0
        };
        Self {
            total,
            unsynced,
            synced_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatusSnapshot {
    pub central_connected: bool,
    pub central_message: String,
    pub mode: SyncMode,
    /// Pending queue entries.
    pub queue_size: u64,
    pub dead_letter_count: u64,
    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,
    pub per_table: BTreeMap<String, TableSyncStats>,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl SyncStatusSnapshot {
    pub fn total_unsynced(&self) -> u64 {
        self.per_table.values().map(|t| t.unsynced).sum()
    }
}

// =============================================================================
// Cycle Report
// =============================================================================

/// Engine state. Only one cycle per store database is ever past `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Pulling,
    Pushing,
}

/// Why a record or queue entry was deliberately not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Pulled record is not newer than the local copy.
    LocalNewerOrEqual,
    /// Queued snapshot was replaced by a later local write.
    Superseded,
    /// Central already holds a strictly newer version.
    CentralNewer,
}

/// Result of one pull or push step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TableReport {
    /// Pulled records written locally (inserted or overwritten).
    pub pulled: u64,
    /// Pulled records where the local copy won.
    pub kept_local: u64,
    /// Queue entries pushed and acknowledged.
    pub pushed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Something that went wrong without stopping the whole cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncIssue {
    pub table: String,
    pub record_id: Option<String>,
    pub seq: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    pub pulled: u64,
    pub pushed: u64,
    pub skipped: u64,
    pub dead_lettered: u64,
    pub per_table: BTreeMap<String, TableReport>,
    pub issues: Vec<SyncIssue>,
    /// Set when the cycle was aborted.
    pub abort_reason: Option<String>,
}

impl SyncReport {
    pub fn new(trigger: SyncTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            trigger,
            started_at,
            finished_at: None,
            outcome: RunOutcome::Completed,
            pulled: 0,
            pushed: 0,
            skipped: 0,
            dead_lettered: 0,
            per_table: BTreeMap::new(),
            issues: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn table_mut(&mut self, table: &str) -> &mut TableReport {
        self.per_table.entry(table.to_string()).or_default()
    }

    /// Tallies a pull step.
    pub fn record_pull(&mut self, table: &str, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Applied => {
                self.pulled += 1;
                self.table_mut(table).pulled += 1;
            }
            StepOutcome::Skipped(_) => self.table_mut(table).kept_local += 1,
            StepOutcome::Failed(_) => self.table_mut(table).failed += 1,
        }
    }

    /// Tallies a push step.
    pub fn record_push(&mut self, table: &str, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Applied => {
                self.pushed += 1;
                self.table_mut(table).pushed += 1;
            }
            StepOutcome::Skipped(_) => {
                self.skipped += 1;
                self.table_mut(table).skipped += 1;
            }
            StepOutcome::Failed(_) => self.table_mut(table).failed += 1,
        }
    }

    pub fn add_issue(&mut self, table: &str, record_id: Option<String>, seq: Option<i64>, message: impl Into<String>) {
        self.issues.push(SyncIssue {
            table: table.to_string(),
            record_id,
            seq,
            message: message.into(),
        });
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.abort_reason = Some(reason.into());
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Stamps `finished_at` and settles the outcome.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
        self.outcome = if self.is_aborted() {
            RunOutcome::Aborted
        } else if self.issues.is_empty() {
            RunOutcome::Completed
        } else {
            RunOutcome::Partial
        };
    }

    /// One-line summary for the sync log.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Sync {} ({}): pulled {}, pushed {}, skipped {}, dead-lettered {}, issues {}",
            self.outcome.as_str(),
            self.trigger.as_str(),
            self.pulled,
            self.pushed,
            self.skipped,
            self.dead_lettered,
            self.issues.len()
        );
        if let Some(reason) = &self.abort_reason {
            line.push_str(&format!(" - {reason}"));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;

    #[test]
    fn test_mode_rule() {
        assert_eq!(SyncMode::derive(false, 0, 0), SyncMode::Offline);
        assert_eq!(SyncMode::derive(false, 5, 3), SyncMode::Offline);
        assert_eq!(SyncMode::derive(true, 0, 0), SyncMode::Online);
        assert_eq!(SyncMode::derive(true, 1, 0), SyncMode::Hybrid);
        assert_eq!(SyncMode::derive(true, 0, 2), SyncMode::Hybrid);
    }

    #[test]
    fn test_synced_percentage() {
        assert_eq!(TableSyncStats::new(0, 0).synced_percentage, 100.0);
        assert_eq!(TableSyncStats::new(4, 1).synced_percentage, 75.0);
        assert_eq!(TableSyncStats::new(3, 1).synced_percentage, 66.67);
        assert_eq!(TableSyncStats::new(3, 3).synced_percentage, 0.0);
    }

    #[test]
    fn test_report_outcome() {
        let mut report = SyncReport::new(SyncTrigger::Manual, clock::now());
        report.record_push("products", &StepOutcome::Applied);
        report.finish(clock::now());
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.per_table["products"].pushed, 1);

        let mut report = SyncReport::new(SyncTrigger::Manual, clock::now());
        report.add_issue("products", Some("42".into()), Some(3), "constraint violated");
        report.finish(clock::now());
        assert_eq!(report.outcome, RunOutcome::Partial);

        let mut report = SyncReport::new(SyncTrigger::Scheduled, clock::now());
        report.abort("central unavailable");
        report.finish(clock::now());
        assert_eq!(report.outcome, RunOutcome::Aborted);
        assert!(report.summary().ends_with("- central unavailable"));
    }

    #[test]
    fn test_step_outcome_json_shape() {
        let json = serde_json::to_value(StepOutcome::Skipped(SkipReason::Superseded)).unwrap();
        assert_eq!(json["kind"], "skipped");
        assert_eq!(json["detail"], "superseded");
    }
}

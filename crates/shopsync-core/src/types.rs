//! # Domain Types
//!
//! The generic record envelope and the bookkeeping types that travel with it.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ SyncableRecord  │   │   QueueEntry    │   │ SyncCheckpoint  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (RecordId)  │   │  seq (FIFO)     │   │  table          │       │
//! │  │  fields         │──►│  payload        │   │  updated_at     │       │
//! │  │  updated_at     │   │  attempts       │   │  last_id        │       │
//! │  │  synced_at      │   │  status         │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    RecordId     │   │   FieldValue    │   │ QueueOperation  │       │
//! │  │  Int(i64)       │   │  Null / Integer │   │  Insert         │       │
//! │  │  Text(String)   │   │  Real / Text    │   │  Update         │       │
//! │  └─────────────────┘   │  Boolean        │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconciled Records
//! A record is reconciled with the central database exactly when
//! `synced_at` is set and not older than `updated_at`. Every local mutation
//! clears `synced_at` in the same transaction that writes the row.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::clock;
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Record Identity
// =============================================================================

/// Primary key of a synchronizable record, stable across both stores.
///
/// The table schema decides which variant a table uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Generates a fresh id for text-keyed tables.
    pub fn new_text() -> Self {
        RecordId::Text(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordId::Int(v) => Some(*v),
            RecordId::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RecordId::Int(_) => None,
            RecordId::Text(v) => Some(v),
        }
    }

    /// JSON form used where the id is stored in a single TEXT column
    /// (checkpoint tie-breakers). Keeps the variant: `42` vs `"42"`.
    pub fn to_json(&self) -> String {
        match self {
            RecordId::Int(v) => v.to_string(),
            RecordId::Text(v) => serde_json::Value::String(v.clone()).to_string(),
        }
    }

    pub fn from_json(raw: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(v) => write!(f, "{v}"),
            RecordId::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId::Int(v)
    }
}

impl From<i32> for RecordId {
    fn from(v: i32) -> Self {
        RecordId::Int(i64::from(v))
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId::Text(v.to_string())
    }
}

impl From<String> for RecordId {
    fn from(v: String) -> Self {
        RecordId::Text(v)
    }
}

// =============================================================================
// Field Values
// =============================================================================

/// A single business field value.
///
/// Serialized untagged so queue payloads read as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Lower-case type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Text(_) => "text",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Real(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("NULL"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Real(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Business fields keyed by column name.
pub type FieldMap = BTreeMap<String, FieldValue>;

// =============================================================================
// Syncable Record
// =============================================================================

/// Generic envelope for a row of any synchronizable table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableRecord {
    pub id: RecordId,

    /// Business fields only; `id`, `updated_at`, `synced_at` live outside.
    pub fields: FieldMap,

    /// Last modification time in whichever store last changed it.
    pub updated_at: DateTime<Utc>,

    /// When the local copy was last reconciled. `None` means pending.
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncableRecord {
    pub fn new(id: impl Into<RecordId>, fields: FieldMap, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            fields,
            updated_at: clock::truncate_millis(updated_at),
            synced_at: None,
        }
    }

    /// Builder-style field setter, mostly for tests and seeding.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// True when `synced_at` is set and not older than `updated_at`.
    pub fn is_reconciled(&self) -> bool {
        matches!(self.synced_at, Some(synced) if synced >= self.updated_at)
    }

    /// Snapshot encoding stored in `sync_queue.payload`.
    pub fn to_payload(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(raw: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// Kind of local mutation a queue entry replays centrally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueOperation {
    Insert,
    Update,
}

impl QueueOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOperation::Insert => "insert",
            QueueOperation::Update => "update",
        }
    }
}

impl FromStr for QueueOperation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(QueueOperation::Insert),
            "update" => Ok(QueueOperation::Update),
            other => Err(CoreError::InvalidPayload(format!("unknown queue operation: {other}"))),
        }
    }
}

/// Queue entry lifecycle.
///
/// ```text
/// enqueue ──► Pending ──push ok──► (removed)
///               │  ▲
///   data error  │  │ retry_dead_letters
///   x max       ▼  │
///              Dead ──discard──► (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Dead,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Dead => "dead",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "dead" => Ok(QueueStatus::Dead),
            other => Err(CoreError::InvalidPayload(format!("unknown queue status: {other}"))),
        }
    }
}

/// A local mutation waiting to be replayed against the central database.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Global, strictly increasing; defines FIFO push order.
    pub seq: i64,
    pub table: String,
    pub operation: QueueOperation,
    pub record_id: RecordId,
    /// Full record snapshot at enqueue time.
    pub payload: SyncableRecord,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: QueueStatus,
}

// =============================================================================
// Checkpoint
// =============================================================================

/// Per-table pull high-water mark.
///
/// `(updated_at, last_id)` is compared lexicographically so a batch that
/// ends in the middle of a run of equal timestamps resumes after the last
/// applied id instead of skipping or re-reading the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub table: String,
    pub updated_at: DateTime<Utc>,
    pub last_id: Option<RecordId>,
}

impl SyncCheckpoint {
    /// Starting position for a table that was never pulled.
    pub fn initial(table: &str) -> Self {
        Self {
            table: table.to_string(),
            updated_at: clock::epoch(),
            last_id: None,
        }
    }

    /// Position just after `record`.
    pub fn after(table: &str, record: &SyncableRecord) -> Self {
        Self {
            table: table.to_string(),
            updated_at: record.updated_at,
            last_id: Some(record.id.clone()),
        }
    }

    /// True if `record` sorts strictly after this checkpoint.
    pub fn is_before(&self, record: &SyncableRecord) -> bool {
        match record.updated_at.cmp(&self.updated_at) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match &self.last_id {
                None => false,
                Some(last) => &record.id > last,
            },
        }
    }
}

// =============================================================================
// Triggers & Outcomes
// =============================================================================

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Operator asked for it; lock contention is reported.
    Manual,
    /// Interval elapsed with auto-sync enabled.
    Scheduled,
    /// Queue depth exceeded the configured threshold.
    Threshold,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Threshold => "threshold",
        }
    }

    #[inline]
    pub fn is_automatic(&self) -> bool {
        !matches!(self, SyncTrigger::Manual)
    }
}

impl FromStr for SyncTrigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SyncTrigger::Manual),
            "scheduled" => Ok(SyncTrigger::Scheduled),
            "threshold" => Ok(SyncTrigger::Threshold),
            other => Err(CoreError::InvalidPayload(format!("unknown trigger: {other}"))),
        }
    }
}

/// How a sync cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every table pulled and the queue drained without issues.
    Completed,
    /// Cycle ran to the end but some tables or entries reported issues.
    Partial,
    /// Central became unavailable; the cycle stopped early.
    Aborted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Partial => "partial",
            RunOutcome::Aborted => "aborted",
        }
    }
}

impl FromStr for RunOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(RunOutcome::Completed),
            "partial" => Ok(RunOutcome::Partial),
            "aborted" => Ok(RunOutcome::Aborted),
            other => Err(CoreError::InvalidPayload(format!("unknown run outcome: {other}"))),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> DateTime<Utc> {
        clock::from_millis(ms).unwrap()
    }

    #[test]
    fn test_record_id_json_keeps_variant() {
        let int = RecordId::Int(42);
        let text = RecordId::Text("42".to_string());

        assert_eq!(int.to_json(), "42");
        assert_eq!(text.to_json(), "\"42\"");
        assert_eq!(RecordId::from_json("42").unwrap(), int);
        assert_eq!(RecordId::from_json("\"42\"").unwrap(), text);
    }

    #[test]
    fn test_field_values_serialize_as_plain_json() {
        let record = SyncableRecord::new(42, FieldMap::new(), ts(1_000))
            .with_field("quantity", 10)
            .with_field("name", "Cola")
            .with_field("price", 1.5)
            .with_field("is_active", true)
            .with_field("note", FieldValue::Null);

        let json: serde_json::Value = serde_json::from_str(&record.to_payload().unwrap()).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["fields"]["quantity"], 10);
        assert_eq!(json["fields"]["name"], "Cola");
        assert_eq!(json["fields"]["is_active"], true);
        assert!(json["fields"]["note"].is_null());

        let back = SyncableRecord::from_payload(&record.to_payload().unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_reconciled_requires_synced_not_older() {
        let mut record = SyncableRecord::new("u1", FieldMap::new(), ts(2_000));
        assert!(!record.is_reconciled());

        record.synced_at = Some(ts(1_999));
        assert!(!record.is_reconciled());

        record.synced_at = Some(ts(2_000));
        assert!(record.is_reconciled());
    }

    #[test]
    fn test_checkpoint_ordering_uses_id_tie_breaker() {
        let initial = SyncCheckpoint::initial("products");
        let at_epoch = SyncableRecord::new(1, FieldMap::new(), clock::epoch());
        assert!(!initial.is_before(&at_epoch));

        let r5 = SyncableRecord::new(5, FieldMap::new(), ts(1_000));
        let r7 = SyncableRecord::new(7, FieldMap::new(), ts(1_000));
        let cp = SyncCheckpoint::after("products", &r5);

        assert!(!cp.is_before(&r5));
        assert!(cp.is_before(&r7));
        assert!(cp.is_before(&SyncableRecord::new(1, FieldMap::new(), ts(1_001))));
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!("update".parse::<QueueOperation>().unwrap(), QueueOperation::Update);
        assert_eq!(QueueStatus::Dead.as_str(), "dead");
        assert_eq!("threshold".parse::<SyncTrigger>().unwrap(), SyncTrigger::Threshold);
        assert!(SyncTrigger::Scheduled.is_automatic());
        assert!(!SyncTrigger::Manual.is_automatic());
        assert!("bogus".parse::<RunOutcome>().is_err());
    }
}

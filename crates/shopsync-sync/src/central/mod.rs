//! # Central Link
//!
//! The sync engine's only door to the central database.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  connect(timeout)        bounded connect, retried inside the window    │
//! │  health_check()          never errors, reports reachable + latency     │
//! │  pull_since(t, cp, n)    rows with (updated_at, id) > cp, ascending    │
//! │  push(t, record)         upsert by id, unless central is strictly newer│
//! │                                                                         │
//! │  Errors:  Unavailable ── network, timeout, closed pool → abort cycle   │
//! │           Data ───────── constraint, decode          → this record     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SyncManager wraps every call in its own timeout as well, so a link
//! that hangs is treated as unavailable.

mod memory;
mod postgres;

pub use memory::MemoryCentralLink;
pub use postgres::PgCentralLink;

use std::time::Duration;

use async_trait::async_trait;
use shopsync_core::schema::TableSchema;
use shopsync_core::{HealthReport, SyncCheckpoint, SyncableRecord};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CentralError {
    #[error("central unavailable: {0}")]
    Unavailable(String),

    #[error("central data error: {0}")]
    Data(String),
}

impl CentralError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CentralError::Unavailable(_))
    }
}

pub type CentralResult<T> = Result<T, CentralError>;

/// How central answered a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAck {
    /// Central now holds the pushed version.
    Applied,
    /// Central kept its own, strictly newer row.
    CentralNewer,
}

#[async_trait]
pub trait CentralLink: Send + Sync {
    /// Short name for logs ("postgres", "memory").
    fn name(&self) -> &str;

    async fn connect(&self, timeout: Duration) -> CentralResult<()>;

    async fn health_check(&self) -> HealthReport;

    async fn pull_since(
        &self,
        schema: &TableSchema,
        checkpoint: &SyncCheckpoint,
        limit: u32,
    ) -> CentralResult<Vec<SyncableRecord>>;

    async fn push(&self, schema: &TableSchema, record: &SyncableRecord) -> CentralResult<PushAck>;
}

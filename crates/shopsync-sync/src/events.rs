//! # Sync Events
//!
//! Push-style notifications for whatever hosts the engine (a dashboard,
//! the CLI's `watch` command).
//!
//! ```text
//!   emit_status    phase changed (idle / pulling / pushing) for a trigger
//!   emit_progress  per-table counts after each pull batch or push step
//!   emit_error     something went wrong; `retryable` says if it may clear
//! ```

use shopsync_core::{SyncPhase, SyncTrigger};

/// Trait for emitting sync events.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, phase: SyncPhase, trigger: SyncTrigger);

    fn emit_progress(&self, table: &str, pulled: u64, pushed: u64);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _phase: SyncPhase, _trigger: SyncTrigger) {}
    fn emit_progress(&self, _table: &str, _pulled: u64, _pushed: u64) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

//! # shopsync-sync: Sync Engine for shopsync
//!
//! Keeps a store's LocalStore and the central PostgreSQL database in step.
//! The store keeps selling while central is unreachable; everything written
//! meanwhile waits in the sync queue and goes out on the next cycle.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncManager (Main Orchestrator)                  │  │
//! │  │                                                                  │  │
//! │  │  sync_now / auto_sync, one cycle at a time (sync_lock row)      │  │
//! │  └───────────┬───────────────────────┬──────────────────┬──────────┘  │
//! │              ▼                       ▼                  ▼              │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌─────────────────┐  │
//! │  │   shopsync-db      │  │   CentralLink      │  │ SyncStatus-     │  │
//! │  │                    │  │                    │  │ Reporter        │  │
//! │  │ records, queue,    │  │ PgCentralLink      │  │                 │  │
//! │  │ checkpoints, runs, │  │ MemoryCentralLink  │  │ mode, queue,    │  │
//! │  │ reconcile tx       │  │ (tests, demos)     │  │ per-table stats │  │
//! │  └────────────────────┘  └────────────────────┘  └─────────────────┘  │
//! │                                                                         │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌─────────────────┐  │
//! │  │  SyncScheduler     │  │  SyncConfig        │  │  SyncLog        │  │
//! │  │  interval + nudge  │  │  TOML + env        │  │  operator file  │  │
//! │  └────────────────────┘  └────────────────────┘  └─────────────────┘  │
//! │                                                                         │
//! │  EVENTS (SyncEventEmitter):                                            │
//! │  • status   - phase changes (idle / pulling / pushing)                 │
//! │  • progress - per-table pulled / pushed counts                         │
//! │  • error    - issues and aborts                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`manager`] - `SyncManager`, the pull/push cycle
//! - [`central`] - `CentralLink` trait with PostgreSQL and in-memory links
//! - [`status`] - `SyncStatusReporter`
//! - [`scheduler`] - Background auto-sync loop
//! - [`config`] - Sync configuration (store id, paths, central, thresholds)
//! - [`events`] - Event emitter trait
//! - [`log`] - Operator-facing sync log file
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shopsync_db::Database;
//! use shopsync_sync::{PgCentralLink, SyncConfig, SyncManager};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(config.db_config()?).await?;
//! let central = Arc::new(PgCentralLink::from_config(&config.central)?);
//!
//! let manager = SyncManager::new(db, central, config);
//! let report = manager.sync_now().await?;
//! println!("{}", report.summary());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod central;
pub mod config;
pub mod error;
pub mod events;
pub mod log;
pub mod manager;
pub mod scheduler;
pub mod status;

// =============================================================================
// Re-exports
// =============================================================================

pub use central::{CentralError, CentralLink, CentralResult, MemoryCentralLink, PgCentralLink, PushAck};
pub use config::{CentralConfig, LocalConfig, StoreConfig, SyncConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use events::{NoOpEmitter, SyncEventEmitter};
pub use log::SyncLog;
pub use manager::{Confirmation, SyncManager};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use status::SyncStatusReporter;

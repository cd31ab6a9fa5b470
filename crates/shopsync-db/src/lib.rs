//! # shopsync-db: LocalStore for shopsync
//!
//! The store's own SQLite database. Every business read and write goes
//! through here, as does every piece of sync bookkeeping.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shopsync Data Flow                               │
//! │                                                                         │
//! │  Till / back office                        SyncManager (shopsync-sync)  │
//! │       │                                          │                      │
//! │       ▼                                          ▼                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    shopsync-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐   ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │HybridDataAccess│   │  Repositories  │   │  Migrations  │  │   │
//! │  │   │  (access.rs)   │──►│ records, queue │   │  (embedded)  │  │   │
//! │  │   │                │   │ checkpoints,   │   │ 001_business │  │   │
//! │  │   │ read / write   │   │ lock, runs,    │   │ 002_sync     │  │   │
//! │  │   │ bulk / execute │   │ reconcile      │   │              │  │   │
//! │  │   └────────────────┘   └───────┬────────┘   └──────────────┘  │   │
//! │  │                                │ Database (pool.rs)            │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              SQLite (WAL) or sqlite::memory: in tests          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Table-level storage (records, queue, checkpoints, ...)
//! - [`access`] - The application-facing HybridDataAccess facade
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopsync_db::{Database, DbConfig, HybridDataAccess, QueueLimits, RecordInput};
//!
//! let db = Database::new(DbConfig::new("path/to/store.db")).await?;
//! let hda = HybridDataAccess::new(db, QueueLimits::default());
//!
//! hda.write("products", RecordInput::with_id(42).set("quantity", 9)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use access::{BulkUpdateReceipt, HybridDataAccess, QueueLimits, RecordInput, WriteReceipt};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::checkpoint::CheckpointRepository;
pub use repository::lock::{LockInfo, SyncLockRepository};
pub use repository::queue::SyncQueueRepository;
pub use repository::reconcile::ReconcileRepository;
pub use repository::records::RecordRepository;
pub use repository::runs::{SyncRunRecord, SyncRunRepository};

//! # Repository Module
//!
//! LocalStore repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Their Tables                        │
//! │                                                                         │
//! │  HybridDataAccess ──┐                  SyncManager ──┐                  │
//! │                     ▼                                ▼                  │
//! │  RecordRepository        stores, users, categories, products,          │
//! │                          transactions (schema-driven SQL)              │
//! │  SyncQueueRepository     sync_queue                                    │
//! │  CheckpointRepository    sync_checkpoints                              │
//! │  SyncLockRepository      sync_lock                                     │
//! │  SyncRunRepository       sync_runs                                     │
//! │  ReconcileRepository     records + queue + checkpoints in one tx       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Modules that take part in multi-statement transactions expose `*_in`
//! functions over `&mut SqliteConnection` alongside their pool-level
//! repository type.

pub mod checkpoint;
pub mod lock;
pub mod queue;
pub mod reconcile;
pub mod records;
pub mod runs;

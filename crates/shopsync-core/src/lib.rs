//! # shopsync-core: Pure Sync Domain for shopsync
//!
//! Everything the sync engine decides without touching a disk or a socket:
//! what a record looks like, which tables exist, how a query is expressed,
//! and who wins when the store and the central database disagree.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shopsync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                shopsync-cli (operator commands)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     shopsync-sync: SyncManager, CentralLink, status reporter    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     shopsync-db: LocalStore, SyncQueue, HybridDataAccess        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shopsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │  types   │ │  schema  │ │  query   │ │   lww    │          │   │
//! │  │   │ Record   │ │ Tables   │ │ Filters  │ │ resolve  │          │   │
//! │  │   │ Queue    │ │ Fields   │ │ Order    │ │          │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Record envelope, field values, queue entries, checkpoints
//! - [`schema`] - Registry of synchronizable tables and field validation
//! - [`query`] - Typed read/filter model used by the data-access facade
//! - [`lww`] - Last-write-wins decisions on `updated_at`
//! - [`clock`] - Millisecond timestamps and epoch conversion
//! - [`status`] - Status snapshot and sync report DTOs (TypeScript exported)
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shopsync_core::{lww, clock};
//!
//! let local = clock::from_millis(1_000).unwrap();
//! let central = clock::from_millis(1_000).unwrap();
//!
//! // Equal timestamps: the local row stays.
//! assert_eq!(lww::resolve(local, central), lww::Resolution::KeepLocal);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod lww;
pub mod query;
pub mod schema;
pub mod status;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use query::{Filter, FilterOp, Query, SortDirection};
pub use schema::{FieldDef, FieldType, IdKind, TableSchema};
pub use status::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Name of the lock row that guards sync cycles.
///
/// One row per store database; a second cycle sees it held and backs off.
pub const SYNC_LOCK_NAME: &str = "sync_cycle";

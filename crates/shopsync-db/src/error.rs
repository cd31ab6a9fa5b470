//! # Database Error Types
//!
//! Error types for LocalStore operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      CoreError / ValidationError           │
//! │       │                                 │                               │
//! │       └────────────────┬────────────────┘                               │
//! │                        ▼                                                │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (shopsync-sync) / caller of HybridDataAccess                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use shopsync_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Table is not a synchronizable table.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Input failed schema validation. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The sync queue reached its configured capacity.
    ///
    /// ## When This Occurs
    /// - Store offline for a long time and `max_queue_size` entries
    ///   (pending + dead-lettered) are waiting
    ///
    /// The write that hit the limit was rolled back in full.
    #[error("Sync queue is full ({max} entries); local write rejected")]
    QueueFull { max: u64 },

    /// A raw statement tried to touch a synchronizable or bookkeeping table.
    ///
    /// Writes to those tables must go through `HybridDataAccess::write` so
    /// they are queued; raw statements are for local-only tables.
    #[error("Raw statement references '{table}', which must be written through the sync-aware API")]
    SyncBypass { table: String },

    /// A stored row could not be decoded (bad payload, bad timestamp).
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn corrupt(table: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::CorruptRow {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownTable(table) => DbError::UnknownTable(table),
            CoreError::Validation(v) => DbError::Validation(v),
            CoreError::InvalidTimestamp(ms) => {
                DbError::corrupt("unknown", format!("invalid timestamp {ms}"))
            }
            CoreError::InvalidPayload(msg) => DbError::corrupt("sync_queue", msg),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_message() {
        let err = DbError::QueueFull { max: 10_000 };
        assert_eq!(
            err.to_string(),
            "Sync queue is full (10000 entries); local write rejected"
        );
    }

    #[test]
    fn test_core_errors_map() {
        let err: DbError = CoreError::UnknownTable("widgets".into()).into();
        assert!(matches!(err, DbError::UnknownTable(t) if t == "widgets"));

        let err: DbError = CoreError::Validation(ValidationError::Required { field: "sku".into() }).into();
        assert!(matches!(err, DbError::Validation(_)));
    }
}

//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Central      │  │     Cycle control       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Central-       │  │  AlreadySyncing         │ │
//! │  │  InvalidUrl     │  │   Unavailable   │  │  ConfirmationRequired   │ │
//! │  │  ConfigLoad/Save│  │  CentralData    │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                               │
//! │  │    LocalStore   │  │    Sync log     │                               │
//! │  │                 │  │                 │                               │
//! │  │  Database(..)   │  │  LogFailed      │                               │
//! │  │  (QueueFull,..) │  │                 │                               │
//! │  └─────────────────┘  └─────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record-level failures inside a cycle never surface here; they become
//! `StepOutcome::Failed` entries and issues on the `SyncReport`.

use shopsync_db::DbError;
use thiserror::Error;

use crate::central::CentralError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid central URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Central Errors
    // =========================================================================
    /// Network failure, timeout or closed pool. The cycle aborts.
    #[error("Central database unavailable: {0}")]
    CentralUnavailable(String),

    /// Central rejected or returned bad data.
    #[error("Central data error: {0}")]
    CentralData(String),

    // =========================================================================
    // Cycle Control
    // =========================================================================
    /// Another cycle holds the sync lock.
    #[error("A sync cycle is already running")]
    AlreadySyncing,

    /// Destructive operation called without explicit confirmation.
    #[error("Confirmation required for this operation")]
    ConfirmationRequired,

    #[error("Sync scheduler is shutting down")]
    ShuttingDown,

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Sync log error: {0}")]
    LogFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CentralError> for SyncError {
    fn from(err: CentralError) -> Self {
        match err {
            CentralError::Unavailable(msg) => SyncError::CentralUnavailable(msg),
            CentralError::Data(msg) => SyncError::CentralData(msg),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt may succeed without operator action.
    ///
    /// ## Retryable Errors
    /// - Central unreachable or timed out
    /// - Another cycle was running
    /// - SQLite busy/pool exhaustion
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::CentralUnavailable(_) | SyncError::AlreadySyncing => true,
            SyncError::Database(db) => matches!(db, DbError::PoolExhausted | DbError::ConnectionFailed(_)),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::CentralUnavailable("connection refused".into()).is_retryable());
        assert!(SyncError::AlreadySyncing.is_retryable());
        assert!(SyncError::Database(DbError::PoolExhausted).is_retryable());

        assert!(!SyncError::CentralData("check constraint".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Database(DbError::QueueFull { max: 10 }).is_retryable());
    }

    #[test]
    fn test_central_error_mapping() {
        let err: SyncError = CentralError::Unavailable("timeout".into()).into();
        assert!(matches!(err, SyncError::CentralUnavailable(_)));

        let err: SyncError = CentralError::Data("duplicate key".into()).into();
        assert!(matches!(err, SyncError::CentralData(_)));
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_config_errors() {
        let err: SyncError = "not a url".parse::<url::Url>().unwrap_err().into();
        assert!(err.is_config_error());
        assert!(!SyncError::AlreadySyncing.is_config_error());
    }
}

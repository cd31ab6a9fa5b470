//! # Error Types
//!
//! Domain-specific error types for shopsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopsync-core errors (this file)                                      │
//! │  ├── CoreError        - Unknown tables, bad timestamps, payloads       │
//! │  └── ValidationError  - Field / id / query validation failures         │
//! │                                                                         │
//! │  shopsync-db errors (separate crate)                                   │
//! │  └── DbError          - LocalStore and queue failures                  │
//! │                                                                         │
//! │  shopsync-sync errors (separate crate)                                 │
//! │  ├── CentralError     - Unavailable vs Data                            │
//! │  └── SyncError        - What callers of SyncManager see                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → CLI         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Table is not part of the synchronizable registry.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Stored epoch millis could not be turned into a timestamp.
    #[error("Invalid timestamp: {0} ms")]
    InvalidTimestamp(i64),

    /// A queued snapshot could not be encoded or decoded.
    #[error("Invalid record payload: {0}")]
    InvalidPayload(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidPayload(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by table schemas before anything reaches SQLite, and by the
/// sync manager when a pulled record does not fit the local schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or null.
    #[error("{field} is required")]
    Required { field: String },

    /// Field is not declared by the table schema.
    #[error("{table} has no field named {field}")]
    UnknownField { table: String, field: String },

    /// Field value has the wrong type for its column.
    #[error("{field} expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Invalid format (e.g., wrong id kind, empty id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");

        let err = ValidationError::TypeMismatch {
            field: "price".to_string(),
            expected: "real".to_string(),
            actual: "text".to_string(),
        };
        assert_eq!(err.to_string(), "price expects real, got text");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_json_error_becomes_invalid_payload() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let core_err: CoreError = err.into();
        assert!(matches!(core_err, CoreError::InvalidPayload(_)));
    }
}

//! Error types for the ledger subsystem.
//!
//! [`LedgerError`] is the primary error type returned by ledger and bus
//! operations. Storage variants (`Sqlite`, `Pool`, `Serde`) are fatal for
//! the current operation; `Validation` means the message never reached the
//! database.

use thiserror::Error;

/// Errors that can occur during ledger and bus operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A message failed publish-time validation; nothing was appended.
    #[error("invalid message: {0}")]
    Validation(String),

    /// Operation attempted on a closed ledger.
    #[error("ledger is closed")]
    Closed,
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = LedgerError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn validation_display() {
        let err = LedgerError::Validation("topic is required".into());
        assert_eq!(err.to_string(), "invalid message: topic is required");
    }

    #[test]
    fn closed_display() {
        assert_eq!(LedgerError::Closed.to_string(), "ledger is closed");
    }

    #[test]
    fn from_rusqlite_error() {
        let err: LedgerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, LedgerError::Sqlite(_)));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: LedgerError = serde_err.into();
        assert!(matches!(err, LedgerError::Serde(_)));
    }
}

//! Error types for the database layer.

use std::time::Duration;
use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input (empty tag, oversized field, ...)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Constraint violation (unique, foreign key, etc.)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Operation not allowed in the asset's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Per-asset lock could not be taken within the configured wait
    #[error("Timed out after {waited:?} waiting for lock on asset {asset_id}")]
    LockTimeout { asset_id: i64, waited: Duration },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } => true,
            Self::Sqlx(sqlx::Error::PoolTimedOut) => true,
            Self::Sqlx(sqlx::Error::Database(db)) => is_busy(db.as_ref()),
            _ => false,
        }
    }

    /// Map a unique-constraint failure into [`DbError::Constraint`], leaving
    /// every other error untouched. `what` receives the database message.
    pub(crate) fn from_unique(err: sqlx::Error, what: impl FnOnce(&str) -> String) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Constraint(what(db.message()))
            }
            _ => Self::Sqlx(err),
        }
    }
}

fn is_busy(err: &dyn sqlx::error::DatabaseError) -> bool {
    // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
    matches!(
        err.code().as_deref().and_then(|c| c.parse::<i64>().ok()).map(|c| c & 0xff),
        Some(5) | Some(6)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = DbError::LockTimeout {
            asset_id: 7,
            waited: Duration::from_millis(250),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("asset 7"));
    }

    #[test]
    fn test_domain_errors_are_not_retryable() {
        assert!(!DbError::not_found("asset 1").is_retryable());
        assert!(!DbError::validation("empty tag").is_retryable());
        assert!(!DbError::invalid_state("deleted").is_retryable());
    }
}

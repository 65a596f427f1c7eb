//! Store Error Types
//!
//! Closed set of error kinds raised by the persistence layer, so callers
//! can branch on kind instead of matching on message text.

use thiserror::Error;

/// Postgres error codes classified as conflicts.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Request rejected before any transaction was opened
    #[error("invalid request: {0}")]
    Validation(String),

    /// Referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Constraint violation, e.g. a referenced account was removed
    /// concurrently or a unique key already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other persistence failure, including commit/rollback failure
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }

    /// Check if retrying the whole call may help
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                    return Self::Conflict(db_err.message().to_string());
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

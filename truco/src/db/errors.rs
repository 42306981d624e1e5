//! Persistence error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Operation exceeded its deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Store temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// External reference already recorded on another transaction
    #[error("Duplicate external reference: {0}")]
    DuplicateReference(String),

    /// Balance changed between read and commit
    #[error("Balance of user {user_id} changed: expected {expected}, found {actual}")]
    BalanceMismatch {
        user_id: i64,
        expected: i64,
        actual: i64,
    },

    /// Stored value could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Unavailable(_) => true,
            StoreError::BalanceMismatch { .. } => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

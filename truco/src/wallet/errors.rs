//! Wallet error types.

use thiserror::Error;

use super::models::{Amount, UserId};
use crate::{db::StoreError, errors::ErrorKind};

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Insufficient balance
    #[error("Insufficient funds for user {user_id}: available {available}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        available: Amount,
        required: Amount,
    },

    /// User not found
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    /// Idempotency key already used for a different mutation
    #[error(
        "Idempotency key {key} reused: recorded user {recorded_user} amount {recorded_amount}, \
         requested user {requested_user} amount {requested_amount}"
    )]
    IdempotencyConflict {
        key: String,
        recorded_user: UserId,
        recorded_amount: Amount,
        requested_user: UserId,
        requested_amount: Amount,
    },

    /// Arithmetic overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Invalid ledger configuration
    #[error("Invalid wallet configuration: {0}")]
    InvalidConfig(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAmount(_) | WalletError::InvalidConfig(_) => ErrorKind::Validation,
            WalletError::UserNotFound(_) => ErrorKind::NotFound,
            WalletError::InsufficientFunds { .. } => ErrorKind::Conflict,
            WalletError::IdempotencyConflict { .. } | WalletError::BalanceOverflow => {
                ErrorKind::Integrity
            }
            WalletError::Store(e) if e.is_transient() => ErrorKind::Transient,
            WalletError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            WalletError::Store(_) => ErrorKind::Integrity,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store errors are sanitized to prevent information disclosure about
    /// the internal system structure, and user IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Store(e) if e.is_transient() => {
                "Service temporarily unavailable".to_string()
            }
            WalletError::Store(_) => "Internal server error".to_string(),
            WalletError::UserNotFound(_) => "User not found".to_string(),
            WalletError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            WalletError::IdempotencyConflict { .. } => "Duplicate request".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

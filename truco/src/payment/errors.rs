//! Payment error types.

use thiserror::Error;

use crate::{
    db::{StoreError, retry::Transient},
    errors::ErrorKind,
    wallet::{Amount, WalletError},
};

/// Payment errors
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Deposit amount not positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    /// Deposit above the configured ceiling
    #[error("Amount {amount} exceeds the maximum deposit of {max}")]
    AmountTooLarge { amount: Amount, max: Amount },

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Provider rejected the request
    #[error("Payment provider rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider unreachable, timed out or overloaded
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider answered with a body we cannot use
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid payment configuration: {0}")]
    InvalidConfig(String),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidAmount(_)
            | PaymentError::AmountTooLarge { .. }
            | PaymentError::InvalidConfig(_) => ErrorKind::Validation,
            PaymentError::Wallet(e) => e.kind(),
            PaymentError::Store(e) if e.is_transient() => ErrorKind::Transient,
            PaymentError::Store(_) => ErrorKind::Integrity,
            PaymentError::ProviderUnavailable(_) => ErrorKind::Transient,
            PaymentError::Provider { .. } | PaymentError::InvalidResponse(_) => {
                ErrorKind::Integrity
            }
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            PaymentError::Wallet(e) => e.client_message(),
            PaymentError::Store(_) | PaymentError::InvalidConfig(_) => {
                "Internal server error".to_string()
            }
            PaymentError::Provider { .. }
            | PaymentError::ProviderUnavailable(_)
            | PaymentError::InvalidResponse(_) => {
                "Payment provider unavailable, try again later".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl Transient for PaymentError {
    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

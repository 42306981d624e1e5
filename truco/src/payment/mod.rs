//! Payments: deposit intents out, provider notifications in.
//!
//! [`DepositService`] opens a provider checkout for a deposit and records
//! the expected payment. [`WebhookReconciler`] turns the provider's
//! notifications into ledger credits keyed by the external reference
//! `user_{user_id}_deposit_{nonce}`.

pub mod config;
pub mod errors;
pub mod intents;
pub mod models;
pub mod provider;
pub mod reconciler;

pub use config::PaymentConfig;
pub use errors::{PaymentError, PaymentResult};
pub use intents::DepositService;
pub use models::{
    DepositIntent, DepositReceipt, IntentStatus, PaymentEvent, PaymentReference, PaymentStatus,
    WebhookOutcome,
};
pub use provider::{Checkout, CheckoutRequest, HttpPaymentProvider, PaymentProvider};
pub use reconciler::WebhookReconciler;

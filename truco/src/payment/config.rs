//! Payment provider configuration.

use std::time::Duration;

use crate::{
    db::retry::RetryPolicy,
    env::{env_or, env_string},
    wallet::Amount,
};

/// Payment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Provider API base URL
    pub api_base: String,

    /// Bearer token; deposits are disabled without one
    pub access_token: Option<String>,

    /// Where the provider posts payment notifications
    pub notification_url: Option<String>,

    /// Where the payer is sent back after checkout
    pub return_url: Option<String>,

    /// ISO 4217 currency code
    pub currency: String,

    /// How long a deposit intent stays payable
    pub intent_ttl: Duration,

    /// Largest single deposit, in minor units
    pub max_deposit_amount: Amount,

    /// Per-request timeout for provider calls
    pub request_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.mercadopago.com".to_string(),
            access_token: None,
            notification_url: None,
            return_url: None,
            currency: "BRL".to_string(),
            intent_ttl: Duration::from_secs(30 * 60),
            max_deposit_amount: 1_000_000,
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl PaymentConfig {
    /// Create configuration from environment variables
    ///
    /// - `PAYMENT_API_BASE`
    /// - `PAYMENT_ACCESS_TOKEN`
    /// - `PAYMENT_NOTIFICATION_URL`
    /// - `PAYMENT_RETURN_URL`
    /// - `PAYMENT_CURRENCY` (default: BRL)
    /// - `PAYMENT_INTENT_TTL_SECS` (default: 1800)
    /// - `MAX_DEPOSIT_AMOUNT` (default: 1000000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_string("PAYMENT_API_BASE").unwrap_or(defaults.api_base),
            access_token: env_string("PAYMENT_ACCESS_TOKEN"),
            notification_url: env_string("PAYMENT_NOTIFICATION_URL"),
            return_url: env_string("PAYMENT_RETURN_URL"),
            currency: env_string("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            intent_ttl: Duration::from_secs(env_or(
                "PAYMENT_INTENT_TTL_SECS",
                defaults.intent_ttl.as_secs(),
            )),
            max_deposit_amount: env_or("MAX_DEPOSIT_AMOUNT", defaults.max_deposit_amount),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_deposit_amount <= 0 {
            return Err("Maximum deposit must be positive".to_string());
        }
        if self.intent_ttl.is_zero() {
            return Err("Intent TTL must be positive".to_string());
        }
        if self.currency.len() != 3 {
            return Err(format!("Invalid currency code {:?}", self.currency));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(format!("Invalid payment API base {:?}", self.api_base));
        }
        Ok(())
    }

    /// Whether a provider client can be built
    pub fn provider_enabled(&self) -> bool {
        self.access_token.is_some()
    }
}

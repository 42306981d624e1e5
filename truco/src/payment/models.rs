//! Payment data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::wallet::{Amount, UserId};

/// Provider-side payment status, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    Cancelled,
    Refunded,
    #[serde(untagged)]
    Other(String),
}

impl From<&str> for PaymentStatus {
    fn from(value: &str) -> Self {
        match value {
            "approved" => PaymentStatus::Approved,
            "pending" | "in_process" => PaymentStatus::Pending,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" | "charged_back" => PaymentStatus::Refunded,
            other => PaymentStatus::Other(other.to_string()),
        }
    }
}

/// Normalized provider notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider event id; each id is processed once
    pub id: String,
    /// Notification topic; only `payment` moves money
    #[serde(rename = "type")]
    pub event_type: String,
    pub status: PaymentStatus,
    pub external_reference: String,
    pub amount: Amount,
}

impl PaymentEvent {
    pub fn approved_payment(id: &str, external_reference: &str, amount: Amount) -> Self {
        Self {
            id: id.to_string(),
            event_type: "payment".to_string(),
            status: PaymentStatus::Approved,
            external_reference: external_reference.to_string(),
            amount,
        }
    }
}

/// Deposit reference in the fixed form `user_{user_id}_deposit_{nonce}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentReference {
    pub user_id: UserId,
    pub nonce: String,
}

impl PaymentReference {
    pub fn new(user_id: UserId, nonce: impl Into<String>) -> Self {
        Self {
            user_id,
            nonce: nonce.into(),
        }
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}_deposit_{}", self.user_id, self.nonce)
    }
}

impl FromStr for PaymentReference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("user_")
            .ok_or_else(|| format!("reference {s:?} does not start with user_"))?;
        let (user, nonce) = rest
            .split_once("_deposit_")
            .ok_or_else(|| format!("reference {s:?} has no _deposit_ segment"))?;
        if user.is_empty() || !user.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("reference {s:?} has a non-numeric user id"));
        }
        let user_id = user
            .parse::<UserId>()
            .map_err(|e| format!("reference {s:?}: {e}"))?;
        if user_id <= 0 {
            return Err(format!("reference {s:?} has a non-positive user id"));
        }
        if nonce.is_empty() || !nonce.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(format!("reference {s:?} has an invalid nonce"));
        }
        Ok(Self::new(user_id, nonce))
    }
}

/// Lifecycle of a deposit intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Completed => "completed",
            IntentStatus::Expired => "expired",
        }
    }
}

impl FromStr for IntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "completed" => Ok(IntentStatus::Completed),
            "expired" => Ok(IntentStatus::Expired),
            other => Err(format!("unknown intent status {other:?}")),
        }
    }
}

/// Deposit the user started with the provider and has not paid yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositIntent {
    pub reference: String,
    pub user_id: UserId,
    pub amount: Amount,
    pub provider_id: String,
    pub redirect_target: String,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Returned to the client that asked for a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub payment_reference_id: String,
    pub redirect_target: String,
}

/// Terminal outcome of one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Balance credited
    Credited { user_id: UserId, transaction_id: i64 },
    /// Event id already handled
    Duplicate,
    /// Not an approved payment
    Ignored { reason: String },
    /// Malformed or inconsistent; acknowledged and dropped
    Discarded { reason: String },
    /// Ledger unavailable after retries; the provider should redeliver
    Failed { reason: String },
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Credited { .. } => "credited",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::Discarded { .. } => "discarded",
            WebhookOutcome::Failed { .. } => "failed",
        }
    }
}

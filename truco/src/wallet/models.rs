//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User ID type
pub type UserId = i64;

/// Money in minor currency units (centavos)
pub type Amount = i64;

/// Account holder with the balance owned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

/// Append-only ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed delta applied to the balance
    pub amount: Amount,
    pub balance_after: Amount,
    pub status: TransactionStatus,
    pub reason: String,
    /// Idempotency key; unique across the ledger when present
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction about to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub reason: String,
    pub external_reference: Option<String>,
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    BetWin,
    BetLoss,
    /// Stake reserved while a hand is in play
    BetHold,
    /// Reserved stake returned when the hand is settled or abandoned
    BetRelease,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::BetWin => "bet_win",
            TransactionKind::BetLoss => "bet_loss",
            TransactionKind::BetHold => "bet_hold",
            TransactionKind::BetRelease => "bet_release",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "bet_win" => Ok(TransactionKind::BetWin),
            "bet_loss" => Ok(TransactionKind::BetLoss),
            "bet_hold" => Ok(TransactionKind::BetHold),
            "bet_release" => Ok(TransactionKind::BetRelease),
            other => Err(format!("unknown transaction kind {other:?}")),
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status {other:?}")),
        }
    }
}

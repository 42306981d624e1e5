//! Wallet ledger: balances and the append-only transaction log.
//!
//! This module implements:
//! - Atomic credit/debit with a per-user single writer
//! - Idempotency keys (external references) so a replayed credit is a no-op
//! - Bet settlement with a configurable payout multiplier
//! - Transaction history and derived player statistics
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use truco::db::MemoryStore;
//! use truco::wallet::{WalletConfig, WalletManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wallet = WalletManager::new(Arc::new(MemoryStore::new()), WalletConfig::default())?;
//!     let user = wallet.open_account("ana", 0).await?;
//!
//!     wallet.credit(user.id, 5_000, "deposit", Some("user_1_deposit_1")).await?;
//!     println!("balance: {}", wallet.get_balance(user.id).await?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod stats;

pub use config::WalletConfig;
pub use errors::{WalletError, WalletResult};
pub use manager::WalletManager;
pub use models::{
    Amount, NewTransaction, Transaction, TransactionKind, TransactionStatus, User, UserId,
};
pub use stats::PlayerStats;

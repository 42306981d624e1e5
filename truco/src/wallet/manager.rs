//! Wallet manager: per-user serialized balance mutations over a `LedgerStore`.

use std::sync::Arc;

use super::{
    config::WalletConfig,
    errors::{WalletError, WalletResult},
    models::{Amount, NewTransaction, Transaction, TransactionKind, User, UserId},
    stats::PlayerStats,
};
use crate::{
    db::{LedgerStore, StoreError, retry::retry},
    locks::KeyedLocks,
};

/// Wallet manager
///
/// Every mutation for a user runs under that user's lock: read balance,
/// check, commit. The store additionally rejects a commit whose expected
/// balance is stale, so a second process cannot cause a lost update either.
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyedLocks<UserId>>,
    config: WalletConfig,
}

impl WalletManager {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Ledger persistence
    /// * `config` - Payout multiplier and retry policy
    ///
    /// # Returns
    ///
    /// * `WalletResult<WalletManager>` - Manager, or `InvalidConfig`
    pub fn new(store: Arc<dyn LedgerStore>, config: WalletConfig) -> WalletResult<Self> {
        config.validate().map_err(WalletError::InvalidConfig)?;
        Ok(Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
            config,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Create a user, optionally funded with an opening deposit
    ///
    /// # Arguments
    ///
    /// * `display_name` - Name shown at tables
    /// * `opening_balance` - Initial deposit, or 0 for an empty account
    ///
    /// # Returns
    ///
    /// * `WalletResult<User>` - The user with its balance after the deposit
    pub async fn open_account(
        &self,
        display_name: &str,
        opening_balance: Amount,
    ) -> WalletResult<User> {
        if opening_balance < 0 {
            return Err(WalletError::InvalidAmount(opening_balance));
        }
        let display_name = display_name.trim();
        let user = retry(&self.config.retry, "create user", || {
            self.store.create_user(display_name)
        })
        .await?;

        if opening_balance == 0 {
            return Ok(user);
        }
        let key = format!("opening_{}", user.id);
        let tx = self
            .credit(user.id, opening_balance, "opening balance", Some(&key))
            .await?;
        Ok(User {
            balance: tx.balance_after,
            ..user
        })
    }

    /// Add funds to a user's balance
    ///
    /// # Arguments
    ///
    /// * `user_id` - User ID
    /// * `amount` - Amount to add (must be positive)
    /// * `reason` - Free text stored on the transaction
    /// * `idempotency_key` - External reference; a repeated key returns the
    ///   original transaction without touching the balance
    ///
    /// # Errors
    ///
    /// * `WalletError::IdempotencyConflict` - Key already used for another user or amount
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        reason: &str,
        idempotency_key: Option<&str>,
    ) -> WalletResult<Transaction> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        self.apply(NewTransaction {
            user_id,
            kind: TransactionKind::Deposit,
            amount,
            reason: reason.to_string(),
            external_reference: idempotency_key.map(str::to_string),
        })
        .await
    }

    /// Remove funds from a user's balance
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientFunds` - Amount exceeds the balance
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        reason: &str,
    ) -> WalletResult<Transaction> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        self.apply(NewTransaction {
            user_id,
            kind: TransactionKind::Withdrawal,
            amount: -amount,
            reason: reason.to_string(),
            external_reference: None,
        })
        .await
    }

    /// Settle one player's wager for a finished hand
    ///
    /// A win credits `wager * payout multiplier` (rounded down); a loss
    /// debits `wager`. A loss larger than the balance fails with
    /// `InsufficientFunds` and leaves the balance untouched.
    ///
    /// # Arguments
    ///
    /// * `user_id` - User ID
    /// * `wager` - Stake for this hand (already multiplied by the truco level)
    /// * `won` - Whether the user's side won
    /// * `idempotency_key` - Settlement key, so a replayed settlement is a no-op
    pub async fn settle_bet(
        &self,
        user_id: UserId,
        wager: Amount,
        won: bool,
        idempotency_key: Option<&str>,
    ) -> WalletResult<Transaction> {
        let entry = self.bet_entry(user_id, wager, won, idempotency_key)?;
        self.apply(entry).await
    }

    /// Reserve a stake for a hand in play
    ///
    /// Debits `amount` as a `bet_hold` row. The reserved funds come back
    /// through [`WalletManager::settle_held_bet`] or
    /// [`WalletManager::release_hold`].
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientFunds` - Balance below `amount`
    pub async fn hold_stake(
        &self,
        user_id: UserId,
        amount: Amount,
        idempotency_key: &str,
    ) -> WalletResult<Transaction> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        self.apply(NewTransaction {
            user_id,
            kind: TransactionKind::BetHold,
            amount: -amount,
            reason: "stake held".to_string(),
            external_reference: Some(idempotency_key.to_string()),
        })
        .await
    }

    /// Return a reserved stake without settling a bet
    pub async fn release_hold(
        &self,
        user_id: UserId,
        amount: Amount,
        idempotency_key: &str,
    ) -> WalletResult<Transaction> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        self.apply(release_entry(user_id, amount, idempotency_key))
            .await
    }

    /// Settle a bet whose stake was reserved with [`WalletManager::hold_stake`]
    ///
    /// The hold release and the `bet_win`/`bet_loss` row commit together, so
    /// a loss no larger than `held` cannot fail for lack of funds and a
    /// replay with the same keys is a no-op.
    ///
    /// # Returns
    ///
    /// * `WalletResult<Transaction>` - The `bet_win` or `bet_loss` row
    pub async fn settle_held_bet(
        &self,
        user_id: UserId,
        held: Amount,
        wager: Amount,
        won: bool,
        release_key: &str,
        settlement_key: &str,
    ) -> WalletResult<Transaction> {
        if held <= 0 {
            return Err(WalletError::InvalidAmount(held));
        }
        let entries = vec![
            release_entry(user_id, held, release_key),
            self.bet_entry(user_id, wager, won, Some(settlement_key))?,
        ];
        self.apply_all(user_id, entries)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Corrupt("settlement recorded no rows".to_string()).into())
    }

    fn bet_entry(
        &self,
        user_id: UserId,
        wager: Amount,
        won: bool,
        idempotency_key: Option<&str>,
    ) -> WalletResult<NewTransaction> {
        if wager <= 0 {
            return Err(WalletError::InvalidAmount(wager));
        }
        let (kind, amount, reason) = if won {
            let payout = self
                .config
                .payout(wager)
                .ok_or(WalletError::BalanceOverflow)?;
            (TransactionKind::BetWin, payout, "bet won")
        } else {
            (TransactionKind::BetLoss, -wager, "bet lost")
        };
        Ok(NewTransaction {
            user_id,
            kind,
            amount,
            reason: reason.to_string(),
            external_reference: idempotency_key.map(str::to_string),
        })
    }

    /// Current balance
    pub async fn get_balance(&self, user_id: UserId) -> WalletResult<Amount> {
        Ok(self.get_user(user_id).await?.balance)
    }

    pub async fn get_user(&self, user_id: UserId) -> WalletResult<User> {
        retry(&self.config.retry, "get user", || self.store.get_user(user_id))
            .await?
            .ok_or(WalletError::UserNotFound(user_id))
    }

    /// Transaction history, newest first
    pub async fn transactions(&self, user_id: UserId, limit: i64) -> WalletResult<Vec<Transaction>> {
        self.get_user(user_id).await?;
        let limit = limit.clamp(1, 1000);
        Ok(retry(&self.config.retry, "list transactions", || {
            self.store.list_transactions(user_id, limit)
        })
        .await?)
    }

    /// Betting statistics over the user's recent history
    pub async fn player_stats(&self, user_id: UserId) -> WalletResult<PlayerStats> {
        let history = self.transactions(user_id, 1000).await?;
        Ok(PlayerStats::from_transactions(
            &history,
            self.config.payout_multiplier_bps,
        ))
    }

    async fn apply(&self, draft: NewTransaction) -> WalletResult<Transaction> {
        let user_id = draft.user_id;
        self.apply_all(user_id, vec![draft])
            .await?
            .pop()
            .ok_or_else(|| StoreError::Corrupt("ledger commit recorded no rows".to_string()).into())
    }

    async fn apply_all(
        &self,
        user_id: UserId,
        drafts: Vec<NewTransaction>,
    ) -> WalletResult<Vec<Transaction>> {
        let _guard = self.locks.lock(&user_id).await;
        retry(&self.config.retry, "ledger commit", || self.try_apply(&drafts)).await
    }

    /// One read-check-commit attempt for one user's entries. Caller holds
    /// the user's lock.
    async fn try_apply(&self, drafts: &[NewTransaction]) -> WalletResult<Vec<Transaction>> {
        let Some(first) = drafts.first() else {
            return Ok(Vec::new());
        };
        if let Some(existing) = self.recorded(drafts).await? {
            return Ok(existing);
        }

        let user = self
            .store
            .get_user(first.user_id)
            .await?
            .ok_or(WalletError::UserNotFound(first.user_id))?;

        let mut balance = user.balance;
        let mut lowest = user.balance;
        for draft in drafts {
            balance = balance
                .checked_add(draft.amount)
                .ok_or(WalletError::BalanceOverflow)?;
            lowest = lowest.min(balance);
        }
        if lowest < 0 {
            return Err(WalletError::InsufficientFunds {
                user_id: user.id,
                available: user.balance,
                required: user.balance.saturating_sub(lowest),
            });
        }

        match self.store.commit_entries(drafts, user.balance).await {
            Ok(rows) => {
                for tx in &rows {
                    log::debug!(
                        "ledger: user {} {} {} -> balance {}",
                        tx.user_id,
                        tx.kind,
                        tx.amount,
                        tx.balance_after
                    );
                }
                Ok(rows)
            }
            Err(StoreError::DuplicateReference(key)) => {
                // Lost a race with another process holding the same key.
                self.recorded(drafts).await?.ok_or_else(|| {
                    StoreError::Corrupt(format!("reference {key} reported but not found")).into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rows already recorded under the drafts' keys. Keyed batches commit
    /// atomically, so either every key is present or none is.
    async fn recorded(&self, drafts: &[NewTransaction]) -> WalletResult<Option<Vec<Transaction>>> {
        let mut found = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(key) = &draft.external_reference else {
                continue;
            };
            if let Some(existing) = self.store.find_by_reference(key).await? {
                found.push(replay(existing, draft)?);
            }
        }
        if found.is_empty() {
            return Ok(None);
        }
        if found.len() != drafts.len() {
            let err = StoreError::Corrupt(format!(
                "ledger batch for user {} partially recorded",
                drafts[0].user_id
            ));
            log::error!("ledger integrity: {err}");
            return Err(err.into());
        }
        Ok(Some(found))
    }
}

fn release_entry(user_id: UserId, amount: Amount, idempotency_key: &str) -> NewTransaction {
    NewTransaction {
        user_id,
        kind: TransactionKind::BetRelease,
        amount,
        reason: "stake released".to_string(),
        external_reference: Some(idempotency_key.to_string()),
    }
}

/// Return the recorded transaction for a reused key, provided it describes
/// the same mutation.
fn replay(existing: Transaction, draft: &NewTransaction) -> WalletResult<Transaction> {
    if existing.user_id == draft.user_id
        && existing.amount == draft.amount
        && existing.kind == draft.kind
    {
        log::debug!(
            "ledger: replayed key {:?} for user {}",
            existing.external_reference,
            existing.user_id
        );
        return Ok(existing);
    }
    let err = WalletError::IdempotencyConflict {
        key: existing.external_reference.clone().unwrap_or_default(),
        recorded_user: existing.user_id,
        recorded_amount: existing.amount,
        requested_user: draft.user_id,
        requested_amount: draft.amount,
    };
    log::error!("ledger integrity: {err}");
    Err(err)
}

impl crate::db::retry::Transient for WalletError {
    fn is_transient(&self) -> bool {
        matches!(self, WalletError::Store(e) if e.is_transient())
    }
}

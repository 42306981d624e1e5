//! Hand settlement: stakes held while a hand is in play, the per-seat
//! ledger writes when it ends, and the retry queue for settlements that
//! could not be applied at once.

use chrono::{DateTime, Utc};
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

use super::{
    errors::{RoomError, RoomResult},
    messages::SettlementStatus,
    models::{GameHistory, Room},
};
use crate::{
    db::{RoomStore, retry::{RetryPolicy, retry}},
    errors::ErrorKind,
    game::{GameSession, HandResult, TrucoLevel},
    wallet::{Amount, UserId, WalletError, WalletManager},
};

/// Stake reserved from every seat for the hand in play
///
/// Each seat holds the wager at the highest stake, so settling a loss never
/// depends on the balance left outside the hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeHold {
    /// Unique per deal
    pub id: String,
    /// Reserved from each seat
    pub amount: Amount,
    /// Seats whose hold is in place
    pub users: Vec<UserId>,
    /// When the hand was dealt
    pub started_at: DateTime<Utc>,
}

impl StakeHold {
    /// Reserve `wager * 4` from every seat of `room`. All or nothing: a
    /// seat that cannot cover it releases the holds already taken.
    ///
    /// # Errors
    ///
    /// * `RoomError::InsufficientFunds` - A seat cannot cover the hold
    pub async fn take(wallet: &WalletManager, room: &Room) -> RoomResult<Self> {
        let amount = room
            .wager
            .checked_mul(TrucoLevel::max_stake_multiplier())
            .ok_or_else(|| RoomError::Internal(format!("wager overflow in room {}", room.id)))?;
        let mut hold = Self {
            id: format!("{}_{}", room.id, Uuid::new_v4().simple()),
            amount,
            users: Vec::with_capacity(room.seats.len()),
            started_at: Utc::now(),
        };

        for seat in &room.seats {
            let key = hold.hold_key(seat.user_id);
            match wallet.hold_stake(seat.user_id, amount, &key).await {
                Ok(_) => hold.users.push(seat.user_id),
                Err(e) => {
                    hold.release(wallet).await;
                    return Err(match e {
                        WalletError::InsufficientFunds {
                            user_id,
                            available,
                            required,
                        } => RoomError::InsufficientFunds {
                            user_id,
                            available,
                            required,
                        },
                        other => other.into(),
                    });
                }
            }
        }
        Ok(hold)
    }

    /// Give every reserved stake back without settling.
    pub async fn release(&self, wallet: &WalletManager) {
        for user_id in &self.users {
            let key = self.release_key(*user_id);
            if let Err(e) = wallet.release_hold(*user_id, self.amount, &key).await {
                log::error!(
                    "Failed to release hold {} for user {}: {}",
                    self.id,
                    user_id,
                    e
                );
            }
        }
    }

    pub fn hold_key(&self, user_id: UserId) -> String {
        format!("hold_{}_{}", self.id, user_id)
    }

    pub fn release_key(&self, user_id: UserId) -> String {
        format!("release_{}_{}", self.id, user_id)
    }
}

/// One user's side of a hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEntry {
    pub user_id: UserId,
    /// Wager times the stake multiplier
    pub stake: Amount,
    pub won: bool,
}

/// Everything needed to settle one finished hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSettlement {
    pub history: GameHistory,
    pub entries: Vec<SettlementEntry>,
    pub hold: StakeHold,
    pub attempts: u32,
}

impl PendingSettlement {
    /// Build the settlement of `result` for every seat of `room`.
    ///
    /// A seat wins when it belongs to the winning side and has not forfeited.
    pub fn for_hand(
        room: &Room,
        session: &GameSession,
        result: &HandResult,
        hold: &StakeHold,
    ) -> RoomResult<Self> {
        let stake = room
            .wager
            .checked_mul(result.stake_multiplier)
            .ok_or_else(|| RoomError::Internal(format!("stake overflow in room {}", room.id)))?;

        let entries: Vec<SettlementEntry> = room
            .seats
            .iter()
            .map(|seat| SettlementEntry {
                user_id: seat.user_id,
                stake,
                won: session.side_of(seat.seat) == result.winning_side
                    && session.is_active(seat.seat),
            })
            .collect();
        if let Some(entry) = entries.iter().find(|e| !hold.users.contains(&e.user_id)) {
            return Err(RoomError::Internal(format!(
                "no stake held for user {} in room {}",
                entry.user_id, room.id
            )));
        }

        let recorded_at = Utc::now();
        let (winners, losers): (Vec<_>, Vec<_>) = entries.iter().partition(|e| e.won);
        Ok(Self {
            history: GameHistory {
                room_id: room.id,
                hand_number: session.hand_number(),
                winning_side: result.winning_side,
                winners: winners.iter().map(|e| e.user_id).collect(),
                losers: losers.iter().map(|e| e.user_id).collect(),
                level: result.level,
                stake_multiplier: result.stake_multiplier,
                wager: room.wager,
                ended_by: result.ended_by,
                started_at: hold.started_at,
                duration_ms: (recorded_at - hold.started_at).num_milliseconds().max(0),
                recorded_at,
            },
            entries,
            hold: hold.clone(),
            attempts: 0,
        })
    }

    /// Apply every ledger entry and the history row.
    ///
    /// Each seat's hold release and bet row commit together under that
    /// seat's keys, so replaying a partially applied settlement only
    /// performs the missing writes. Losses go first; no winner is paid
    /// while a loss is outstanding.
    pub async fn apply(
        &self,
        wallet: &WalletManager,
        store: &dyn RoomStore,
        policy: &RetryPolicy,
    ) -> RoomResult<()> {
        let losses = self.entries.iter().filter(|e| !e.won);
        let wins = self.entries.iter().filter(|e| e.won);
        for entry in losses.chain(wins) {
            wallet
                .settle_held_bet(
                    entry.user_id,
                    self.hold.amount,
                    entry.stake,
                    entry.won,
                    &self.hold.release_key(entry.user_id),
                    &self.history.settlement_key(entry.user_id),
                )
                .await?;
        }

        let inserted = retry(policy, "record history", || store.record_history(&self.history)).await?;
        if !inserted {
            log::debug!(
                "History for room {} hand {} already recorded",
                self.history.room_id,
                self.history.hand_number
            );
        }
        Ok(())
    }
}

/// A settlement that failed for a reason a retry cannot fix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSettlement {
    pub settlement: PendingSettlement,
    pub reason: String,
}

/// Settlements waiting for another attempt. Entries are only removed once
/// they have been applied; non-transient failures move to the rejected list
/// for an operator instead of being retried.
#[derive(Debug, Default)]
pub struct SettlementQueue {
    pending: Mutex<VecDeque<PendingSettlement>>,
    rejected: Mutex<Vec<RejectedSettlement>>,
}

impl SettlementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, settlement: PendingSettlement) {
        log::warn!(
            "Queued settlement for room {} hand {} (attempt {})",
            settlement.history.room_id,
            settlement.history.hand_number,
            settlement.attempts
        );
        self.queue().push_back(settlement);
    }

    /// File a failed settlement: transient failures are queued for retry,
    /// anything else is rejected.
    pub fn record_failure(
        &self,
        settlement: PendingSettlement,
        error: &RoomError,
    ) -> SettlementStatus {
        if error.kind() == ErrorKind::Transient {
            self.push(settlement);
            return SettlementStatus::Queued;
        }
        log::error!(
            "Settlement integrity failure for room {} hand {} (winners {:?}, losers {:?}, hold {}): {}",
            settlement.history.room_id,
            settlement.history.hand_number,
            settlement.history.winners,
            settlement.history.losers,
            settlement.hold.id,
            error
        );
        self.rejected_list().push(RejectedSettlement {
            settlement,
            reason: error.to_string(),
        });
        SettlementStatus::Rejected
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Snapshot of queued settlements
    pub fn pending(&self) -> Vec<PendingSettlement> {
        self.queue().iter().cloned().collect()
    }

    /// Snapshot of rejected settlements
    pub fn rejected(&self) -> Vec<RejectedSettlement> {
        self.rejected_list().clone()
    }

    /// Attempt every queued settlement once.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of settlements applied
    pub async fn retry_pending(
        &self,
        wallet: &WalletManager,
        store: &dyn RoomStore,
        policy: &RetryPolicy,
    ) -> usize {
        let batch: Vec<PendingSettlement> = self.queue().drain(..).collect();
        let mut settled = 0;

        for mut settlement in batch {
            settlement.attempts += 1;
            match settlement.apply(wallet, store, policy).await {
                Ok(()) => {
                    log::info!(
                        "Settled room {} hand {} after {} retries",
                        settlement.history.room_id,
                        settlement.history.hand_number,
                        settlement.attempts
                    );
                    settled += 1;
                }
                Err(e) => {
                    log::error!(
                        "Settlement retry failed for room {} hand {}: {}",
                        settlement.history.room_id,
                        settlement.history.hand_number,
                        e
                    );
                    self.record_failure(settlement, &e);
                }
            }
        }
        settled
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<PendingSettlement>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rejected_list(&self) -> MutexGuard<'_, Vec<RejectedSettlement>> {
        self.rejected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Repository trait definitions for testability and dependency injection.
//!
//! The core talks to persistence only through these traits. [`PgStore`]
//! implements them on PostgreSQL; [`super::MemoryStore`] keeps everything in
//! process for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{
    errors::{StoreError, StoreResult},
    retry::{DEFAULT_TRANSACTION_TIMEOUT, with_default_timeout, with_timeout},
};
use crate::{
    game::{HandEnd, TrucoLevel},
    payment::{DepositIntent, IntentStatus},
    room::{GameHistory, NewRoom, Room, RoomId, RoomStatus, SeatAssignment},
    wallet::{Amount, NewTransaction, Transaction, TransactionStatus, User, UserId},
};

/// Users, balances and the append-only transaction log
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a user with a zero balance
    async fn create_user(&self, display_name: &str) -> StoreResult<User>;

    /// Find user by ID
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>>;

    /// Find the transaction recorded under an external reference
    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>>;

    /// Append `tx` and move the balance from `expected_balance` to
    /// `expected_balance + tx.amount` in one atomic step.
    ///
    /// Fails with `BalanceMismatch` if the stored balance is not
    /// `expected_balance`, and with `DuplicateReference` if the reference is
    /// already recorded. Nothing is written in either case.
    async fn commit(&self, tx: &NewTransaction, expected_balance: Amount)
    -> StoreResult<Transaction> {
        self.commit_entries(std::slice::from_ref(tx), expected_balance)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Corrupt("commit recorded no rows".to_string()))
    }

    /// Append every entry of one user's batch, in order, and move the
    /// balance by their sum. Either all rows are written or none.
    ///
    /// The running balance after each entry must stay non-negative.
    async fn commit_entries(
        &self,
        entries: &[NewTransaction],
        expected_balance: Amount,
    ) -> StoreResult<Vec<Transaction>>;

    /// Most recent transactions first
    async fn list_transactions(&self, user_id: UserId, limit: i64)
    -> StoreResult<Vec<Transaction>>;
}

/// Rooms, seats and hand history
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert a room in `Waiting` with no seats
    async fn create_room(&self, room: &NewRoom) -> StoreResult<Room>;

    /// Overwrite status, seats and hand count
    async fn save_room(&self, room: &Room) -> StoreResult<()>;

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>>;

    async fn delete_room(&self, room_id: RoomId) -> StoreResult<()>;

    /// Insert a history row. Returns `false` if (room, hand) already exists.
    async fn record_history(&self, history: &GameHistory) -> StoreResult<bool>;

    async fn list_history(&self, room_id: RoomId) -> StoreResult<Vec<GameHistory>>;
}

/// Webhook dedupe and deposit intents
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool>;

    async fn mark_event_processed(&self, event_id: &str, outcome: &str) -> StoreResult<()>;

    async fn save_intent(&self, intent: &DepositIntent) -> StoreResult<()>;

    async fn get_intent(&self, reference: &str) -> StoreResult<Option<DepositIntent>>;

    async fn set_intent_status(&self, reference: &str, status: IntentStatus) -> StoreResult<()>;

    /// Mark pending intents past their expiry. Returns how many changed.
    async fn expire_intents(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Default PostgreSQL implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_seats(&self, room_id: RoomId) -> StoreResult<Vec<SeatAssignment>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT seat_index, user_id, forfeited FROM room_seats
                 WHERE room_id = $1 ORDER BY seat_index",
            )
            .bind(room_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows
            .iter()
            .map(|r| SeatAssignment {
                seat: r.get::<i16, _>("seat_index") as usize,
                user_id: r.get("user_id"),
                forfeited: r.get("forfeited"),
            })
            .collect())
    }
}

fn utc(row: &PgRow, column: &str) -> DateTime<Utc> {
    row.get::<NaiveDateTime, _>(column).and_utc()
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> StoreResult<T> {
    row.get::<String, _>(column)
        .parse()
        .map_err(StoreError::Corrupt)
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        display_name: row.get("display_name"),
        balance: row.get("balance"),
        created_at: utc(row, "created_at"),
    }
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    Ok(Transaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: parse_column(row, "kind")?,
        amount: row.get("amount"),
        balance_after: row.get("balance_after"),
        status: parse_column(row, "status")?,
        reason: row.get("reason"),
        external_reference: row.get("external_reference"),
        created_at: utc(row, "created_at"),
    })
}

fn intent_from_row(row: &PgRow) -> StoreResult<DepositIntent> {
    Ok(DepositIntent {
        reference: row.get("reference"),
        user_id: row.get("user_id"),
        amount: row.get("amount"),
        provider_id: row.get("provider_id"),
        redirect_target: row.get("redirect_target"),
        status: parse_column(row, "status")?,
        created_at: utc(row, "created_at"),
        expires_at: utc(row, "expires_at"),
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Balance after each entry of a single-user batch.
///
/// Rejects mixed users, references repeated within the batch and any
/// intermediate balance below zero.
pub(crate) fn running_balances(
    entries: &[NewTransaction],
    expected_balance: Amount,
) -> StoreResult<Vec<Amount>> {
    let mut balance = expected_balance;
    let mut balances = Vec::with_capacity(entries.len());
    for (i, tx) in entries.iter().enumerate() {
        if tx.user_id != entries[0].user_id {
            return Err(StoreError::Corrupt("ledger batch spans users".to_string()));
        }
        if let Some(reference) = &tx.external_reference
            && entries[..i]
                .iter()
                .any(|prev| prev.external_reference.as_ref() == Some(reference))
        {
            return Err(StoreError::DuplicateReference(reference.clone()));
        }
        balance = balance
            .checked_add(tx.amount)
            .filter(|b| *b >= 0)
            .ok_or_else(|| StoreError::Corrupt("balance out of range".to_string()))?;
        balances.push(balance);
    }
    Ok(balances)
}

const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount, balance_after, status, reason,
     external_reference, created_at";

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_user(&self, display_name: &str) -> StoreResult<User> {
        let row = with_default_timeout(
            sqlx::query(
                "INSERT INTO users (display_name) VALUES ($1)
                 RETURNING id, display_name, balance, created_at",
            )
            .bind(display_name)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(user_from_row(&row))
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, display_name, balance, created_at FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE external_reference = $1"
            ))
            .bind(reference)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn commit_entries(
        &self,
        entries: &[NewTransaction],
        expected_balance: Amount,
    ) -> StoreResult<Vec<Transaction>> {
        let balances = running_balances(entries, expected_balance)?;
        let Some((first, new_balance)) = entries.first().zip(balances.last().copied()) else {
            return Ok(Vec::new());
        };
        let user_id = first.user_id;

        let work = async {
            let mut db_tx = self.pool.begin().await?;

            // Optimistic check: only move the balance if nobody else did.
            let updated = sqlx::query(
                "UPDATE users SET balance = $1
                 WHERE id = $2 AND balance = $3
                 RETURNING balance",
            )
            .bind(new_balance)
            .bind(user_id)
            .bind(expected_balance)
            .fetch_optional(&mut *db_tx)
            .await?;

            if updated.is_none() {
                let current = sqlx::query("SELECT balance FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *db_tx)
                    .await?;
                return Ok(Err(match current {
                    Some(row) => StoreError::BalanceMismatch {
                        user_id,
                        expected: expected_balance,
                        actual: row.get("balance"),
                    },
                    None => StoreError::NotFound(format!("user {user_id}")),
                }));
            }

            let mut rows = Vec::with_capacity(entries.len());
            for (tx, balance_after) in entries.iter().zip(&balances) {
                let inserted = sqlx::query(&format!(
                    "INSERT INTO transactions
                        (user_id, kind, amount, balance_after, status, reason, external_reference)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     RETURNING {TRANSACTION_COLUMNS}"
                ))
                .bind(tx.user_id)
                .bind(tx.kind.as_str())
                .bind(tx.amount)
                .bind(*balance_after)
                .bind(TransactionStatus::Completed.as_str())
                .bind(&tx.reason)
                .bind(&tx.external_reference)
                .fetch_one(&mut *db_tx)
                .await;

                match inserted {
                    Ok(row) => rows.push(row),
                    Err(e) if is_unique_violation(&e) => {
                        return Ok(Err(StoreError::DuplicateReference(
                            tx.external_reference.clone().unwrap_or_default(),
                        )));
                    }
                    Err(e) => return Err(e),
                }
            }

            db_tx.commit().await?;
            Ok::<_, sqlx::Error>(Ok(rows))
        };

        // Dropping the uncommitted sqlx transaction rolls it back.
        let rows = with_timeout(DEFAULT_TRANSACTION_TIMEOUT, work).await??;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn list_transactions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE user_id = $1 ORDER BY id DESC LIMIT $2"
            ))
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn create_room(&self, room: &NewRoom) -> StoreResult<Room> {
        let row = with_default_timeout(
            sqlx::query(
                "INSERT INTO rooms
                    (name, creator_id, max_seats, wager, is_private, secret_hash, invite_code, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING id, hands_played, created_at, updated_at",
            )
            .bind(&room.name)
            .bind(room.creator_id)
            .bind(room.max_seats as i16)
            .bind(room.wager)
            .bind(room.is_private)
            .bind(&room.secret_hash)
            .bind(&room.invite_code)
            .bind(RoomStatus::Waiting.as_str())
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(Room {
            id: row.get("id"),
            name: room.name.clone(),
            creator_id: room.creator_id,
            max_seats: room.max_seats,
            wager: room.wager,
            is_private: room.is_private,
            secret_hash: room.secret_hash.clone(),
            invite_code: room.invite_code.clone(),
            seats: Vec::new(),
            status: RoomStatus::Waiting,
            hands_played: row.get::<i32, _>("hands_played") as u32,
            created_at: utc(&row, "created_at"),
            updated_at: utc(&row, "updated_at"),
        })
    }

    async fn save_room(&self, room: &Room) -> StoreResult<()> {
        let work = async {
            let mut db_tx = self.pool.begin().await?;

            sqlx::query(
                "UPDATE rooms SET status = $1, hands_played = $2, updated_at = NOW()
                 WHERE id = $3",
            )
            .bind(room.status.as_str())
            .bind(room.hands_played as i32)
            .bind(room.id)
            .execute(&mut *db_tx)
            .await?;

            sqlx::query("DELETE FROM room_seats WHERE room_id = $1")
                .bind(room.id)
                .execute(&mut *db_tx)
                .await?;

            for seat in &room.seats {
                sqlx::query(
                    "INSERT INTO room_seats (room_id, seat_index, user_id, forfeited)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(room.id)
                .bind(seat.seat as i16)
                .bind(seat.user_id)
                .bind(seat.forfeited)
                .execute(&mut *db_tx)
                .await?;
            }

            db_tx.commit().await
        };

        with_timeout(DEFAULT_TRANSACTION_TIMEOUT, work).await
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT id, name, creator_id, max_seats, wager, is_private, secret_hash,
                        invite_code, status, hands_played, created_at, updated_at
                 FROM rooms WHERE id = $1",
            )
            .bind(room_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let seats = self.load_seats(room_id).await?;

        Ok(Some(Room {
            id: row.get("id"),
            name: row.get("name"),
            creator_id: row.get("creator_id"),
            max_seats: row.get::<i16, _>("max_seats") as usize,
            wager: row.get("wager"),
            is_private: row.get("is_private"),
            secret_hash: row.get("secret_hash"),
            invite_code: row.get("invite_code"),
            seats,
            status: parse_column(&row, "status")?,
            hands_played: row.get::<i32, _>("hands_played") as u32,
            created_at: utc(&row, "created_at"),
            updated_at: utc(&row, "updated_at"),
        }))
    }

    async fn delete_room(&self, room_id: RoomId) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM rooms WHERE id = $1")
                .bind(room_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn record_history(&self, history: &GameHistory) -> StoreResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "INSERT INTO game_history
                    (room_id, hand_number, winning_side, winners, losers, level,
                     stake_multiplier, wager, ended_by, started_at, duration_ms, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT (room_id, hand_number) DO NOTHING",
            )
            .bind(history.room_id)
            .bind(history.hand_number as i32)
            .bind(history.winning_side as i16)
            .bind(&history.winners)
            .bind(&history.losers)
            .bind(history.level.to_string())
            .bind(history.stake_multiplier)
            .bind(history.wager)
            .bind(ended_by_str(history.ended_by))
            .bind(history.started_at.naive_utc())
            .bind(history.duration_ms)
            .bind(history.recorded_at.naive_utc())
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_history(&self, room_id: RoomId) -> StoreResult<Vec<GameHistory>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT room_id, hand_number, winning_side, winners, losers, level,
                        stake_multiplier, wager, ended_by, started_at, duration_ms,
                        recorded_at
                 FROM game_history WHERE room_id = $1 ORDER BY hand_number",
            )
            .bind(room_id)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|r| {
                Ok(GameHistory {
                    room_id: r.get("room_id"),
                    hand_number: r.get::<i32, _>("hand_number") as u32,
                    winning_side: r.get::<i16, _>("winning_side") as usize,
                    winners: r.get("winners"),
                    losers: r.get("losers"),
                    level: parse_level(&r.get::<String, _>("level"))?,
                    stake_multiplier: r.get("stake_multiplier"),
                    wager: r.get("wager"),
                    ended_by: parse_ended_by(&r.get::<String, _>("ended_by"))?,
                    started_at: utc(r, "started_at"),
                    duration_ms: r.get("duration_ms"),
                    recorded_at: utc(r, "recorded_at"),
                })
            })
            .collect()
    }
}

fn ended_by_str(ended_by: HandEnd) -> &'static str {
    match ended_by {
        HandEnd::Tricks => "tricks",
        HandEnd::Fold => "fold",
        HandEnd::Forfeit => "forfeit",
    }
}

fn parse_ended_by(s: &str) -> StoreResult<HandEnd> {
    match s {
        "tricks" => Ok(HandEnd::Tricks),
        "fold" => Ok(HandEnd::Fold),
        "forfeit" => Ok(HandEnd::Forfeit),
        other => Err(StoreError::Corrupt(format!("unknown hand end {other:?}"))),
    }
}

fn parse_level(s: &str) -> StoreResult<TrucoLevel> {
    match s {
        "none" => Ok(TrucoLevel::None),
        "truco" => Ok(TrucoLevel::Truco),
        "six" => Ok(TrucoLevel::Six),
        "nine" => Ok(TrucoLevel::Nine),
        "twelve" => Ok(TrucoLevel::Twelve),
        other => Err(StoreError::Corrupt(format!("unknown truco level {other:?}"))),
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool> {
        let row = with_default_timeout(
            sqlx::query("SELECT 1 FROM processed_webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.is_some())
    }

    async fn mark_event_processed(&self, event_id: &str, outcome: &str) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO processed_webhook_events (event_id, outcome) VALUES ($1, $2)
                 ON CONFLICT (event_id) DO NOTHING",
            )
            .bind(event_id)
            .bind(outcome)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn save_intent(&self, intent: &DepositIntent) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO deposit_intents
                    (reference, user_id, amount, provider_id, redirect_target, status,
                     created_at, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&intent.reference)
            .bind(intent.user_id)
            .bind(intent.amount)
            .bind(&intent.provider_id)
            .bind(&intent.redirect_target)
            .bind(intent.status.as_str())
            .bind(intent.created_at.naive_utc())
            .bind(intent.expires_at.naive_utc())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn get_intent(&self, reference: &str) -> StoreResult<Option<DepositIntent>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT reference, user_id, amount, provider_id, redirect_target, status,
                        created_at, expires_at
                 FROM deposit_intents WHERE reference = $1",
            )
            .bind(reference)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(intent_from_row).transpose()
    }

    async fn set_intent_status(&self, reference: &str, status: IntentStatus) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE deposit_intents SET status = $1 WHERE reference = $2")
                .bind(status.as_str())
                .bind(reference)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn expire_intents(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE deposit_intents SET status = 'expired'
                 WHERE status = 'pending' AND expires_at < $1",
            )
            .bind(now.naive_utc())
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_end_text_round_trip() {
        for end in [HandEnd::Tricks, HandEnd::Fold, HandEnd::Forfeit] {
            assert_eq!(parse_ended_by(ended_by_str(end)).unwrap(), end);
        }
        assert!(matches!(parse_ended_by("resign"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_level_text_matches_display() {
        let mut level = TrucoLevel::None;
        loop {
            assert_eq!(parse_level(&level.to_string()).unwrap(), level);
            match level.next() {
                Some(next) => level = next,
                None => break,
            }
        }
    }
}

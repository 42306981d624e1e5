//! In-process store for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use super::{
    errors::{StoreError, StoreResult},
    repository::{LedgerStore, PaymentStore, RoomStore, running_balances},
};
use crate::{
    payment::{DepositIntent, IntentStatus},
    room::{GameHistory, NewRoom, Room, RoomId, RoomStatus},
    wallet::{Amount, NewTransaction, Transaction, TransactionStatus, User, UserId},
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    transactions: Vec<Transaction>,
    references: HashMap<String, usize>,
    rooms: HashMap<RoomId, Room>,
    history: BTreeMap<(RoomId, u32), GameHistory>,
    processed_events: HashMap<String, String>,
    intents: HashMap<String, DepositIntent>,
    next_user_id: UserId,
    next_room_id: RoomId,
}

/// Implements every store trait on in-memory maps.
///
/// `fail_next` makes the following operations fail with a transient error,
/// which lets tests exercise retry and fail-closed paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failures: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` store operations with `StoreError::Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of rows in the transaction log.
    pub fn transaction_count(&self) -> usize {
        self.state().transactions.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self) -> StoreResult<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_user(&self, display_name: &str) -> StoreResult<User> {
        self.check_fault()?;
        let mut state = self.state();
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            display_name: display_name.to_string(),
            balance: 0,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        self.check_fault()?;
        Ok(self.state().users.get(&user_id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>> {
        self.check_fault()?;
        let state = self.state();
        Ok(state
            .references
            .get(reference)
            .and_then(|idx| state.transactions.get(*idx))
            .cloned())
    }

    async fn commit_entries(
        &self,
        entries: &[NewTransaction],
        expected_balance: Amount,
    ) -> StoreResult<Vec<Transaction>> {
        self.check_fault()?;
        let balances = running_balances(entries, expected_balance)?;
        let Some(user_id) = entries.first().map(|tx| tx.user_id) else {
            return Ok(Vec::new());
        };
        let mut state = self.state();

        let actual = state
            .users
            .get(&user_id)
            .map(|u| u.balance)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        if actual != expected_balance {
            return Err(StoreError::BalanceMismatch {
                user_id,
                expected: expected_balance,
                actual,
            });
        }
        if let Some(reference) = entries
            .iter()
            .filter_map(|tx| tx.external_reference.as_ref())
            .find(|reference| state.references.contains_key(*reference))
        {
            return Err(StoreError::DuplicateReference(reference.clone()));
        }

        let mut records = Vec::with_capacity(entries.len());
        for (tx, balance_after) in entries.iter().zip(balances) {
            let record = Transaction {
                id: state.transactions.len() as i64 + 1,
                user_id,
                kind: tx.kind,
                amount: tx.amount,
                balance_after,
                status: TransactionStatus::Completed,
                reason: tx.reason.clone(),
                external_reference: tx.external_reference.clone(),
                created_at: Utc::now(),
            };
            if let Some(reference) = &tx.external_reference {
                let idx = state.transactions.len();
                state.references.insert(reference.clone(), idx);
            }
            state.transactions.push(record.clone());
            if let Some(user) = state.users.get_mut(&user_id) {
                user.balance = balance_after;
            }
            records.push(record);
        }
        Ok(records)
    }

    async fn list_transactions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        self.check_fault()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state()
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, room: &NewRoom) -> StoreResult<Room> {
        self.check_fault()?;
        let mut state = self.state();
        state.next_room_id += 1;
        let now = Utc::now();
        let created = Room {
            id: state.next_room_id,
            name: room.name.clone(),
            creator_id: room.creator_id,
            max_seats: room.max_seats,
            wager: room.wager,
            is_private: room.is_private,
            secret_hash: room.secret_hash.clone(),
            invite_code: room.invite_code.clone(),
            seats: Vec::new(),
            status: RoomStatus::Waiting,
            hands_played: 0,
            created_at: now,
            updated_at: now,
        };
        state.rooms.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save_room(&self, room: &Room) -> StoreResult<()> {
        self.check_fault()?;
        let mut state = self.state();
        let stored = state
            .rooms
            .get_mut(&room.id)
            .ok_or_else(|| StoreError::NotFound(format!("room {}", room.id)))?;
        *stored = Room {
            updated_at: Utc::now(),
            ..room.clone()
        };
        Ok(())
    }

    async fn get_room(&self, room_id: RoomId) -> StoreResult<Option<Room>> {
        self.check_fault()?;
        Ok(self.state().rooms.get(&room_id).cloned())
    }

    async fn delete_room(&self, room_id: RoomId) -> StoreResult<()> {
        self.check_fault()?;
        self.state().rooms.remove(&room_id);
        Ok(())
    }

    async fn record_history(&self, history: &GameHistory) -> StoreResult<bool> {
        self.check_fault()?;
        let mut state = self.state();
        let key = (history.room_id, history.hand_number);
        if state.history.contains_key(&key) {
            return Ok(false);
        }
        state.history.insert(key, history.clone());
        Ok(true)
    }

    async fn list_history(&self, room_id: RoomId) -> StoreResult<Vec<GameHistory>> {
        self.check_fault()?;
        Ok(self
            .state()
            .history
            .range((room_id, 0)..=(room_id, u32::MAX))
            .map(|(_, h)| h.clone())
            .collect())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool> {
        self.check_fault()?;
        Ok(self.state().processed_events.contains_key(event_id))
    }

    async fn mark_event_processed(&self, event_id: &str, outcome: &str) -> StoreResult<()> {
        self.check_fault()?;
        self.state()
            .processed_events
            .entry(event_id.to_string())
            .or_insert_with(|| outcome.to_string());
        Ok(())
    }

    async fn save_intent(&self, intent: &DepositIntent) -> StoreResult<()> {
        self.check_fault()?;
        let mut state = self.state();
        if state.intents.contains_key(&intent.reference) {
            return Err(StoreError::DuplicateReference(intent.reference.clone()));
        }
        state
            .intents
            .insert(intent.reference.clone(), intent.clone());
        Ok(())
    }

    async fn get_intent(&self, reference: &str) -> StoreResult<Option<DepositIntent>> {
        self.check_fault()?;
        Ok(self.state().intents.get(reference).cloned())
    }

    async fn set_intent_status(&self, reference: &str, status: IntentStatus) -> StoreResult<()> {
        self.check_fault()?;
        if let Some(intent) = self.state().intents.get_mut(reference) {
            intent.status = status;
        }
        Ok(())
    }

    async fn expire_intents(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.check_fault()?;
        let mut expired = 0;
        for intent in self.state().intents.values_mut() {
            if intent.status == IntentStatus::Pending && intent.expires_at < now {
                intent.status = IntentStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::TransactionKind;

    fn deposit(user_id: UserId, amount: Amount, reference: Option<&str>) -> NewTransaction {
        NewTransaction {
            user_id,
            kind: TransactionKind::Deposit,
            amount,
            reason: "test".to_string(),
            external_reference: reference.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_commit_checks_expected_balance() {
        let store = MemoryStore::new();
        let user = store.create_user("ana").await.unwrap();

        let tx = store.commit(&deposit(user.id, 50, None), 0).await.unwrap();
        assert_eq!(tx.balance_after, 50);

        let err = store.commit(&deposit(user.id, 50, None), 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::BalanceMismatch {
                expected: 0,
                actual: 50,
                ..
            }
        ));
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_commit_rejects_duplicate_reference() {
        let store = MemoryStore::new();
        let user = store.create_user("ana").await.unwrap();
        store
            .commit(&deposit(user.id, 10, Some("ref-1")), 0)
            .await
            .unwrap();

        let err = store
            .commit(&deposit(user.id, 10, Some("ref-1")), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference(_)));
        assert_eq!(store.transaction_count(), 1);
        assert!(store.find_by_reference("ref-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_entries_is_all_or_nothing() {
        let store = MemoryStore::new();
        let user = store.create_user("ana").await.unwrap();
        store
            .commit(&deposit(user.id, 10, Some("ref-1")), 0)
            .await
            .unwrap();

        let batch = [
            deposit(user.id, 5, Some("ref-2")),
            deposit(user.id, 5, Some("ref-1")),
        ];
        let err = store.commit_entries(&batch, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference(r) if r == "ref-1"));
        assert_eq!(store.transaction_count(), 1);
        assert!(store.find_by_reference("ref-2").await.unwrap().is_none());

        // Dipping below zero part way through rejects the whole batch.
        let batch = [deposit(user.id, -15, None), deposit(user.id, 20, None)];
        assert!(store.commit_entries(&batch, 10).await.is_err());
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 10);

        let batch = [deposit(user.id, 20, None), deposit(user.id, -15, None)];
        let rows = store.commit_entries(&batch, 10).await.unwrap();
        assert_eq!(
            rows.iter().map(|r| r.balance_after).collect::<Vec<_>>(),
            vec![30, 15]
        );
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().balance, 15);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(store.create_user("a").await.unwrap_err().is_transient());
        assert!(store.create_user("b").await.unwrap_err().is_transient());
        assert!(store.create_user("c").await.is_ok());
    }

    #[tokio::test]
    async fn test_history_is_unique_per_hand() {
        let store = MemoryStore::new();
        let history = GameHistory {
            room_id: 1,
            hand_number: 1,
            winning_side: 0,
            winners: vec![1],
            losers: vec![2],
            level: crate::game::TrucoLevel::None,
            stake_multiplier: 1,
            wager: 10,
            ended_by: crate::game::HandEnd::Tricks,
            started_at: Utc::now(),
            duration_ms: 0,
            recorded_at: Utc::now(),
        };
        assert!(store.record_history(&history).await.unwrap());
        assert!(!store.record_history(&history).await.unwrap());
        assert_eq!(store.list_history(1).await.unwrap().len(), 1);
        assert!(store.list_history(2).await.unwrap().is_empty());
    }
}

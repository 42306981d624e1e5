//! Room manager for spawning and addressing room actors.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use super::{
    actor::{RoomActor, RoomContext, RoomHandle},
    config::{CreateRoomRequest, RoomConfig},
    errors::{RoomError, RoomResult},
    messages::{ActionOutcome, RoomMessage, RoomStateResponse},
    models::{GameHistory, NewRoom, Room, RoomId, RoomStatus, RoomSummary},
    secret::{generate_invite_code, hash_secret},
    settlement::SettlementQueue,
};
use crate::{
    db::{RoomStore, retry::retry},
    game::{Action, GameView, SeatIndex, ShuffleSource},
    wallet::{UserId, WalletManager},
};

/// Room manager
///
/// Owns one actor per open room. All room mutations are forwarded to the
/// room's actor, which applies them in arrival order.
pub struct RoomManager {
    ctx: RoomContext,

    /// Active room handles
    rooms: Arc<RwLock<HashMap<RoomId, RoomHandle>>>,
}

impl RoomManager {
    /// Create a new room manager
    ///
    /// # Arguments
    ///
    /// * `wallet` - Ledger used for balance checks and settlement
    /// * `store` - Room persistence
    /// * `shuffle` - Randomness for every deal
    /// * `config` - Room configuration
    ///
    /// # Returns
    ///
    /// * `RoomResult<RoomManager>` - Manager, or `Validation` for a bad config
    pub fn new(
        wallet: WalletManager,
        store: Arc<dyn RoomStore>,
        shuffle: Arc<dyn ShuffleSource>,
        config: RoomConfig,
    ) -> RoomResult<Self> {
        config.validate().map_err(RoomError::Validation)?;
        Ok(Self {
            ctx: RoomContext {
                wallet,
                store,
                shuffle,
                settlements: Arc::new(SettlementQueue::new()),
                config,
            },
            rooms: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Settlements waiting for a retry
    pub fn settlements(&self) -> &Arc<SettlementQueue> {
        &self.ctx.settlements
    }

    /// Create a room in `Waiting` and spawn its actor
    ///
    /// The creator is not seated; they join like everyone else.
    ///
    /// # Errors
    ///
    /// * `RoomError::Validation` - Bad name, seat count, wager or secret
    /// * `RoomError::Wallet` - Creator does not exist
    pub async fn create_room(&self, request: CreateRoomRequest) -> RoomResult<Room> {
        request.validate().map_err(RoomError::Validation)?;
        self.ctx.wallet.get_user(request.creator_id).await?;

        let secret_hash = match request.secret {
            Some(secret) if request.is_private => {
                Some(hash_secret(secret).await.map_err(RoomError::Internal)?)
            }
            _ => None,
        };
        let new_room = NewRoom {
            name: request.name.trim().to_string(),
            creator_id: request.creator_id,
            max_seats: request.max_seats,
            wager: request.wager,
            is_private: request.is_private,
            secret_hash,
            invite_code: request.is_private.then(generate_invite_code),
        };

        // Not retried: a timed-out insert may still have landed.
        let room = self.ctx.store.create_room(&new_room).await?;

        let (actor, handle) = RoomActor::new(room.clone(), self.ctx.clone());
        self.rooms.write().await.insert(room.id, handle);
        tokio::spawn(async move {
            actor.run().await;
        });

        log::info!(
            "Created room {} '{}' ({} seats, wager {})",
            room.id,
            room.name,
            room.max_seats,
            room.wager
        );
        Ok(room)
    }

    /// Get a room handle
    pub async fn get_room(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    /// Take the next free seat
    ///
    /// # Errors
    ///
    /// * `RoomFull`, `AlreadyJoined`, `RoomNotFound`, `BadSecret`
    pub async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        secret: Option<String>,
    ) -> RoomResult<Room> {
        self.handle(room_id)
            .await?
            .request(|response| RoomMessage::Join {
                user_id,
                secret,
                response,
            })
            .await?
    }

    /// Deal the first hand. Concurrent starts produce exactly one session;
    /// the others fail with `AlreadyStarted`.
    pub async fn start_game(&self, room_id: RoomId, requester: UserId) -> RoomResult<GameView> {
        self.handle(room_id)
            .await?
            .request(|response| RoomMessage::Start {
                requester,
                response,
            })
            .await?
    }

    /// Apply `action` for `seat`, which must belong to `user_id`
    ///
    /// # Returns
    ///
    /// * `RoomResult<ActionOutcome>` - The acting seat's view, plus the
    ///   settlement when the action ended a hand
    pub async fn apply_action(
        &self,
        room_id: RoomId,
        user_id: UserId,
        seat: SeatIndex,
        action: Action,
    ) -> RoomResult<ActionOutcome> {
        self.handle(room_id)
            .await?
            .request(|response| RoomMessage::Act {
                user_id,
                seat,
                action,
                response,
            })
            .await?
    }

    /// Leave a room. While a hand is in play the seat is forfeited instead.
    pub async fn leave_room(&self, room_id: RoomId, user_id: UserId) -> RoomResult<Room> {
        self.handle(room_id)
            .await?
            .request(|response| RoomMessage::Leave { user_id, response })
            .await?
    }

    /// Room summary plus the game as seen from `viewer`'s seat
    pub async fn room_state(
        &self,
        room_id: RoomId,
        viewer: Option<UserId>,
    ) -> RoomResult<RoomStateResponse> {
        self.handle(room_id)
            .await?
            .request(|response| RoomMessage::GetState { viewer, response })
            .await
    }

    /// Rooms open for joining, newest first
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut rooms = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(state) = handle
                .request(|response| RoomMessage::GetState {
                    viewer: None,
                    response,
                })
                .await
                && state.room.status == RoomStatus::Waiting
            {
                rooms.push(state.room);
            }
        }
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rooms
    }

    /// Settled hands of a room, in order
    pub async fn history(&self, room_id: RoomId) -> RoomResult<Vec<GameHistory>> {
        let store = self.ctx.store.as_ref();
        Ok(retry(&self.ctx.config.retry, "list history", || {
            store.list_history(room_id)
        })
        .await?)
    }

    /// Stop a room's actor
    pub async fn close_room(&self, room_id: RoomId) -> RoomResult<()> {
        let handle = self.handle(room_id).await?;
        // A closed inbox means the actor is already gone.
        let _ = handle
            .request(|response| RoomMessage::Close { response })
            .await;
        self.rooms.write().await.remove(&room_id);
        log::info!("Closed room {}", room_id);
        Ok(())
    }

    /// Close rooms idle past the TTL. Rooms that never started are deleted
    /// from the store as well.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of rooms closed
    pub async fn collect_idle_rooms(&self) -> usize {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut collected = 0;

        for handle in handles {
            let room_id = handle.room_id();
            let closed = match handle
                .request(|response| RoomMessage::CloseIfIdle { response })
                .await
            {
                Ok(Some(status)) => Some(status),
                Ok(None) => None,
                // Actor already stopped
                Err(_) => Some(RoomStatus::Finished),
            };
            let Some(status) = closed else {
                continue;
            };

            self.rooms.write().await.remove(&room_id);
            collected += 1;
            if status == RoomStatus::Waiting
                && let Err(e) = self.ctx.store.delete_room(room_id).await
            {
                log::warn!("Failed to delete idle room {}: {}", room_id, e);
            }
        }

        if collected > 0 {
            log::info!("Collected {} idle rooms", collected);
        }
        collected
    }

    /// Replay queued settlements
    ///
    /// # Returns
    ///
    /// * `usize` - Number of settlements applied
    pub async fn retry_pending_settlements(&self) -> usize {
        self.ctx
            .settlements
            .retry_pending(
                &self.ctx.wallet,
                self.ctx.store.as_ref(),
                &self.ctx.config.retry,
            )
            .await
    }

    /// Get active room count
    pub async fn active_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Stop every room actor
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self
            .rooms
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            let _ = handle
                .request(|response| RoomMessage::Close { response })
                .await;
        }
        log::info!("Room manager shut down");
    }

    async fn handle(&self, room_id: RoomId) -> RoomResult<RoomHandle> {
        self.get_room(room_id)
            .await
            .ok_or(RoomError::RoomNotFound(room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, game::NoShuffle, wallet::WalletConfig};

    async fn manager() -> (RoomManager, UserId) {
        let store = Arc::new(MemoryStore::new());
        let wallet = WalletManager::new(store.clone(), WalletConfig::default()).unwrap();
        let creator = wallet.open_account("creator", 1_000).await.unwrap();
        let manager =
            RoomManager::new(wallet, store, Arc::new(NoShuffle), RoomConfig::default()).unwrap();
        (manager, creator.id)
    }

    fn request(creator_id: UserId) -> CreateRoomRequest {
        CreateRoomRequest {
            name: " mesa ".to_string(),
            creator_id,
            max_seats: 2,
            wager: 10,
            is_private: false,
            secret: None,
        }
    }

    #[tokio::test]
    async fn test_create_room_starts_empty() {
        let (manager, creator) = manager().await;
        let room = manager.create_room(request(creator)).await.unwrap();

        assert_eq!(room.name, "mesa");
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.seats.is_empty());
        assert!(room.invite_code.is_none());
        assert_eq!(manager.active_room_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_private_room_gets_invite_code() {
        let (manager, creator) = manager().await;
        let room = manager
            .create_room(CreateRoomRequest {
                is_private: true,
                secret: Some("segredo".to_string()),
                ..request(creator)
            })
            .await
            .unwrap();
        assert_eq!(room.invite_code.as_deref().map(str::len), Some(6));
        assert!(room.secret_hash.is_some());
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let (manager, creator) = manager().await;
        let err = manager.join_room(99, creator, None).await.unwrap_err();
        assert!(matches!(err, RoomError::RoomNotFound(99)));
    }

    #[tokio::test]
    async fn test_unknown_creator_is_rejected() {
        let (manager, _) = manager().await;
        let err = manager.create_room(request(404)).await.unwrap_err();
        assert!(matches!(err, RoomError::Wallet(_)));
        assert_eq!(manager.active_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_rooms_shows_waiting_rooms_newest_first() {
        let (manager, creator) = manager().await;
        let first = manager.create_room(request(creator)).await.unwrap();
        let second = manager.create_room(request(creator)).await.unwrap();

        let listed = manager.list_rooms().await;
        assert_eq!(
            listed.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }

    #[tokio::test]
    async fn test_close_room_removes_handle() {
        let (manager, creator) = manager().await;
        let room = manager.create_room(request(creator)).await.unwrap();
        manager.close_room(room.id).await.unwrap();
        assert_eq!(manager.active_room_count().await, 0);
        assert!(manager.room_state(room.id, None).await.is_err());
    }
}

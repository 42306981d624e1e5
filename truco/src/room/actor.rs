//! Room actor: the single writer for one room and its game session.

use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, interval},
};

use super::{
    config::RoomConfig,
    errors::{RoomError, RoomResult},
    messages::{ActionOutcome, HandSettlement, RoomMessage, RoomStateResponse, SettlementStatus},
    models::{Room, RoomId, RoomStatus, SeatAssignment},
    secret::verify_secret,
    settlement::{PendingSettlement, SettlementQueue, StakeHold},
};
use crate::{
    db::{RoomStore, retry::retry},
    game::{Action, GameSession, GameView, MIN_SEATS, SeatIndex, ShuffleSource},
    wallet::{UserId, WalletManager},
};

/// Inbox capacity per room
const INBOX_CAPACITY: usize = 100;

/// Collaborators shared by every room actor
#[derive(Clone)]
pub struct RoomContext {
    pub wallet: WalletManager,
    pub store: Arc<dyn RoomStore>,
    pub shuffle: Arc<dyn ShuffleSource>,
    pub settlements: Arc<SettlementQueue>,
    pub config: RoomConfig,
}

/// Room actor handle for sending messages
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    room_id: RoomId,
}

impl RoomHandle {
    pub fn new(sender: mpsc::Sender<RoomMessage>, room_id: RoomId) -> Self {
        Self { sender, room_id }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Send a message to the room
    pub async fn send(&self, message: RoomMessage) -> RoomResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::Closed(self.room_id))
    }

    /// Send a message built around a fresh response channel and wait for the answer
    pub async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> RoomResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await.map_err(|_| RoomError::Closed(self.room_id))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Room actor owning one room. Every mutation of the room and its game
/// session happens inside [`RoomActor::run`], one message at a time.
pub struct RoomActor {
    room: Room,

    /// Present from the first deal on
    game: Option<GameSession>,

    /// Stakes reserved for the hand in play
    hold: Option<StakeHold>,

    /// Message inbox
    inbox: mpsc::Receiver<RoomMessage>,

    ctx: RoomContext,

    /// When the seat holding the turn started its clock
    turn_started: Instant,

    last_activity: Instant,

    /// Room row changed in memory but not yet persisted
    dirty: bool,

    is_closed: bool,
}

impl RoomActor {
    /// Create a new room actor
    ///
    /// # Returns
    ///
    /// * `(RoomActor, RoomHandle)` - Actor and handle for sending messages
    pub fn new(room: Room, ctx: RoomContext) -> (Self, RoomHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = RoomHandle::new(sender, room.id);
        let now = Instant::now();
        let actor = Self {
            room,
            game: None,
            hold: None,
            inbox,
            ctx,
            turn_started: now,
            last_activity: now,
            dirty: false,
            is_closed: false,
        };
        (actor, handle)
    }

    /// Run the room actor event loop
    pub async fn run(mut self) {
        log::info!("Room {} '{}' open", self.room.id, self.room.name);

        let mut tick_interval = interval(self.ctx.config.tick_interval);

        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                    if self.is_closed {
                        break;
                    }
                }

                _ = tick_interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.release_stakes().await;
        log::info!("Room {} '{}' closed", self.room.id, self.room.name);
    }

    /// Give back the stakes of a hand that will never settle.
    async fn release_stakes(&mut self) {
        if let Some(hold) = self.hold.take() {
            log::warn!(
                "Room {} closed with hand {} unsettled, releasing stakes",
                self.room.id,
                self.game.as_ref().map_or(0, |g| g.hand_number())
            );
            hold.release(&self.ctx.wallet).await;
        }
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                user_id,
                secret,
                response,
            } => {
                let result = self.handle_join(user_id, secret).await;
                let _ = response.send(result);
            }

            RoomMessage::Leave { user_id, response } => {
                let result = self.handle_leave(user_id).await;
                let _ = response.send(result);
            }

            RoomMessage::Start {
                requester,
                response,
            } => {
                let result = self.handle_start(requester).await;
                let _ = response.send(result);
            }

            RoomMessage::Act {
                user_id,
                seat,
                action,
                response,
            } => {
                let result = self.handle_action(user_id, seat, action).await;
                let _ = response.send(result);
            }

            RoomMessage::GetState { viewer, response } => {
                let _ = response.send(self.get_state(viewer));
            }

            RoomMessage::CloseIfIdle { response } => {
                let closed = self.is_idle().then_some(self.room.status);
                if closed.is_some() {
                    log::info!(
                        "Room {} idle for {:?}, closing",
                        self.room.id,
                        self.last_activity.elapsed()
                    );
                    self.is_closed = true;
                }
                let _ = response.send(closed);
            }

            RoomMessage::Close { response } => {
                self.release_stakes().await;
                self.is_closed = true;
                let _ = response.send(());
            }
        }
    }

    async fn handle_join(&mut self, user_id: UserId, secret: Option<String>) -> RoomResult<Room> {
        if self.room.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted(self.room.id));
        }
        if self.room.seat_of(user_id).is_some() {
            return Err(RoomError::AlreadyJoined {
                room_id: self.room.id,
                user_id,
            });
        }
        if self.room.is_full() {
            return Err(RoomError::RoomFull(self.room.id));
        }
        if self.room.is_private {
            let hash = self.room.secret_hash.clone().ok_or_else(|| {
                RoomError::Internal(format!("private room {} has no secret", self.room.id))
            })?;
            let Some(secret) = secret else {
                return Err(RoomError::BadSecret(self.room.id));
            };
            if !verify_secret(hash, secret).await {
                log::debug!("Room {}: bad secret from user {}", self.room.id, user_id);
                return Err(RoomError::BadSecret(self.room.id));
            }
        }
        self.ctx.wallet.get_user(user_id).await?;

        let mut next = self.room.clone();
        next.seats.push(SeatAssignment {
            seat: next.seats.len(),
            user_id,
            forfeited: false,
        });
        self.persist(&next).await?;
        self.room = next;
        self.touch();

        log::info!(
            "User {} joined room {} ({}/{})",
            user_id,
            self.room.id,
            self.room.seats.len(),
            self.room.max_seats
        );
        Ok(self.room.clone())
    }

    async fn handle_leave(&mut self, user_id: UserId) -> RoomResult<Room> {
        let seat = self.room.seat_of(user_id).ok_or(RoomError::NotSeated {
            room_id: self.room.id,
            user_id,
        })?;

        match self.room.status {
            RoomStatus::Waiting => {
                let mut next = self.room.clone();
                next.seats.retain(|s| s.user_id != user_id);
                for (index, s) in next.seats.iter_mut().enumerate() {
                    s.seat = index;
                }
                self.persist(&next).await?;
                self.room = next;
                self.touch();
                log::info!("User {} left room {}", user_id, self.room.id);
            }
            RoomStatus::Playing => {
                if self.room.seats.iter().any(|s| s.seat == seat && s.forfeited) {
                    return Ok(self.room.clone());
                }
                let mut next_game = self.playing_game()?.clone();
                next_game.forfeit(seat)?;

                let mut next = self.room.clone();
                if let Some(s) = next.seats.iter_mut().find(|s| s.seat == seat) {
                    s.forfeited = true;
                }
                self.persist(&next).await?;
                self.room = next;
                self.touch();
                log::info!(
                    "User {} forfeited seat {} in room {}",
                    user_id,
                    seat,
                    self.room.id
                );
                self.commit_game(next_game).await?;
            }
            RoomStatus::Finished => {}
        }
        Ok(self.room.clone())
    }

    async fn handle_start(&mut self, requester: UserId) -> RoomResult<GameView> {
        if self.room.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted(self.room.id));
        }
        let requester_seat = self.room.seat_of(requester).ok_or(RoomError::NotSeated {
            room_id: self.room.id,
            user_id: requester,
        })?;
        if self.room.seats.len() < MIN_SEATS {
            return Err(RoomError::NotEnoughPlayers {
                room_id: self.room.id,
                seated: self.room.seats.len(),
                required: MIN_SEATS,
            });
        }

        // Every seat reserves the loss at the highest stake.
        let hold = StakeHold::take(&self.ctx.wallet, &self.room).await?;
        let game = match GameSession::deal(self.room.seats.len(), self.ctx.shuffle.as_ref()) {
            Ok(game) => game,
            Err(e) => {
                hold.release(&self.ctx.wallet).await;
                return Err(e.into());
            }
        };
        let mut next = self.room.clone();
        next.status = RoomStatus::Playing;
        if let Err(e) = self.persist(&next).await {
            hold.release(&self.ctx.wallet).await;
            return Err(e);
        }

        self.room = next;
        let view = game.view(Some(requester_seat));
        self.game = Some(game);
        self.hold = Some(hold);
        self.turn_started = Instant::now();
        self.touch();

        log::info!(
            "Room {} started with {} players",
            self.room.id,
            self.room.seats.len()
        );
        Ok(view)
    }

    async fn handle_action(
        &mut self,
        user_id: UserId,
        seat: SeatIndex,
        action: Action,
    ) -> RoomResult<ActionOutcome> {
        let game = self.playing_game()?;
        if self.room.user_at(seat) != Some(user_id) {
            return Err(RoomError::SeatMismatch { seat, user_id });
        }

        let mut next_game = game.clone();
        next_game.apply(seat, action)?;
        log::debug!("Room {}: seat {} {}", self.room.id, seat, action);

        self.touch();
        let settlement = self.commit_game(next_game).await?;
        let view = self
            .game
            .as_ref()
            .map(|g| g.view(Some(seat)))
            .ok_or_else(|| RoomError::Internal("game vanished after commit".to_string()))?;

        Ok(ActionOutcome {
            view,
            room_status: self.room.status,
            settlement,
        })
    }

    fn get_state(&self, viewer: Option<UserId>) -> RoomStateResponse {
        let seat = viewer.and_then(|user_id| self.room.seat_of(user_id));
        RoomStateResponse {
            room: self.room.summary(),
            seats: self.room.seats.clone(),
            seat,
            game: self.game.as_ref().map(|g| g.view(seat)),
        }
    }

    /// Install `next` as the live session. A completed hand is settled
    /// before this returns, then the room either re-deals or finishes.
    async fn commit_game(&mut self, mut next: GameSession) -> RoomResult<Option<HandSettlement>> {
        self.turn_started = Instant::now();
        let Some(result) = next.result().copied() else {
            self.game = Some(next);
            return Ok(None);
        };

        let hold = self.hold.clone().ok_or_else(|| {
            RoomError::Internal(format!("room {} finished a hand with no stakes held", self.room.id))
        })?;
        let pending = PendingSettlement::for_hand(&self.room, &next, &result, &hold)?;
        self.hold = None;
        let status = match pending
            .apply(&self.ctx.wallet, self.ctx.store.as_ref(), &self.ctx.config.retry)
            .await
        {
            Ok(()) => SettlementStatus::Applied,
            Err(e) => {
                log::error!(
                    "Room {} hand {}: settlement failed: {}",
                    self.room.id,
                    pending.history.hand_number,
                    e
                );
                self.ctx.settlements.record_failure(pending.clone(), &e)
            }
        };

        let mut room = self.room.clone();
        room.hands_played += 1;
        let forfeits = next.forfeited().iter().any(|f| *f);
        if forfeits || room.hands_played >= self.ctx.config.hands_per_room {
            room.status = RoomStatus::Finished;
        } else {
            match StakeHold::take(&self.ctx.wallet, &room).await {
                Ok(hold) => match next.redeal(self.ctx.shuffle.as_ref()) {
                    Ok(()) => self.hold = Some(hold),
                    Err(e) => {
                        log::error!("Room {}: redeal failed, finishing: {}", room.id, e);
                        hold.release(&self.ctx.wallet).await;
                        room.status = RoomStatus::Finished;
                    }
                },
                Err(e) => {
                    log::warn!("Room {}: cannot hold stakes for the next hand, finishing: {}", room.id, e);
                    room.status = RoomStatus::Finished;
                }
            }
        }

        // Settlement is already keyed and applied; a failed room write is
        // retried on the next tick.
        self.dirty = self.persist(&room).await.is_err();
        if self.dirty {
            log::error!("Room {}: failed to persist after hand, will retry", room.id);
        }
        log::info!(
            "Room {} hand {} won by side {} at {} ({:?})",
            room.id,
            pending.history.hand_number,
            result.winning_side,
            result.level,
            room.status
        );
        self.room = room;
        self.game = Some(next);

        Ok(Some(HandSettlement {
            hand_number: pending.history.hand_number,
            result,
            winners: pending.history.winners,
            losers: pending.history.losers,
            status,
        }))
    }

    async fn tick(&mut self) {
        if self.dirty {
            let room = self.room.clone();
            self.dirty = self.persist(&room).await.is_err();
        }
        if self.room.status != RoomStatus::Playing
            || self.turn_started.elapsed() < self.ctx.config.turn_timeout
        {
            return;
        }
        let Some(game) = self.game.as_ref() else {
            return;
        };
        let Some((seat, action)) = game.timeout_action() else {
            return;
        };

        log::info!(
            "Room {}: seat {} timed out, applying '{}'",
            self.room.id,
            seat,
            action
        );
        let mut next = game.clone();
        if let Err(e) = next.apply(seat, action) {
            log::error!("Room {}: timeout action rejected: {}", self.room.id, e);
            self.turn_started = Instant::now();
            return;
        }
        if let Err(e) = self.commit_game(next).await {
            log::error!("Room {}: failed to commit timeout action: {}", self.room.id, e);
        }
    }

    fn playing_game(&self) -> RoomResult<&GameSession> {
        match (&self.game, self.room.status) {
            (Some(game), RoomStatus::Playing) => Ok(game),
            _ => Err(RoomError::NotPlaying(self.room.id)),
        }
    }

    fn is_idle(&self) -> bool {
        self.room.status != RoomStatus::Playing
            && self.last_activity.elapsed() >= self.ctx.config.idle_ttl
    }

    async fn persist(&self, room: &Room) -> RoomResult<()> {
        let store = self.ctx.store.as_ref();
        retry(&self.ctx.config.retry, "save room", || store.save_room(room)).await?;
        Ok(())
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

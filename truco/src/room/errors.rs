//! Session manager error types.

use thiserror::Error;

use super::models::RoomId;
use crate::{
    db::StoreError,
    errors::ErrorKind,
    game::{GameError, SeatIndex},
    wallet::{Amount, UserId, WalletError},
};

/// Room errors
#[derive(Debug, Error)]
pub enum RoomError {
    /// Malformed request
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Room {0} not found")]
    RoomNotFound(RoomId),

    #[error("Room {0} is full")]
    RoomFull(RoomId),

    #[error("User {user_id} already seated in room {room_id}")]
    AlreadyJoined { room_id: RoomId, user_id: UserId },

    #[error("Wrong secret for room {0}")]
    BadSecret(RoomId),

    /// User holds no seat in the room
    #[error("User {user_id} is not seated in room {room_id}")]
    NotSeated { room_id: RoomId, user_id: UserId },

    /// Seat acted on by a user who does not own it
    #[error("Seat {seat} does not belong to user {user_id}")]
    SeatMismatch { seat: SeatIndex, user_id: UserId },

    #[error("Room {room_id} needs at least {required} players, has {seated}")]
    NotEnoughPlayers {
        room_id: RoomId,
        seated: usize,
        required: usize,
    },

    #[error("Room {0} has already started")]
    AlreadyStarted(RoomId),

    #[error("Room {0} has no hand in play")]
    NotPlaying(RoomId),

    /// A seated player cannot cover the worst-case loss
    #[error("User {user_id} holds {available}, room requires {required}")]
    InsufficientFunds {
        user_id: UserId,
        available: Amount,
        required: Amount,
    },

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Room actor stopped before answering
    #[error("Room {0} is closed")]
    Closed(RoomId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::Validation(_) | RoomError::BadSecret(_) => ErrorKind::Validation,
            RoomError::RoomNotFound(_) | RoomError::Closed(_) => ErrorKind::NotFound,
            RoomError::RoomFull(_)
            | RoomError::AlreadyJoined { .. }
            | RoomError::NotSeated { .. }
            | RoomError::SeatMismatch { .. }
            | RoomError::NotEnoughPlayers { .. }
            | RoomError::AlreadyStarted(_)
            | RoomError::NotPlaying(_)
            | RoomError::InsufficientFunds { .. } => ErrorKind::Conflict,
            RoomError::Game(e) => e.kind(),
            RoomError::Wallet(e) => e.kind(),
            RoomError::Store(e) if e.is_transient() => ErrorKind::Transient,
            RoomError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            RoomError::Store(_) | RoomError::Internal(_) => ErrorKind::Integrity,
        }
    }

    /// Message safe to return to a player
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Game(e) => e.client_message(),
            RoomError::Wallet(e) => e.client_message(),
            RoomError::Store(e) if e.is_transient() => {
                "Service temporarily unavailable".to_string()
            }
            RoomError::Store(_) | RoomError::Internal(_) => "Internal server error".to_string(),
            RoomError::BadSecret(_) => "Wrong room secret".to_string(),
            RoomError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            RoomError::SeatMismatch { .. } => "That seat is not yours".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for room operations
pub type RoomResult<T> = Result<T, RoomError>;

//! Rules engine error types.

use thiserror::Error;

use super::entities::SeatIndex;
use crate::errors::ErrorKind;

/// Rejections and invariant failures raised by [`super::GameSession`].
///
/// A rejected action never mutates the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Seat count outside 2..=6
    #[error("Invalid seat count: {0}")]
    InvalidSeatCount(usize),

    /// Seat does not exist or already forfeited
    #[error("Seat {0} is not in the hand")]
    UnknownSeat(SeatIndex),

    /// Acting seat does not hold the turn
    #[error("Not your turn: seat {seat} acted, turn belongs to seat {expected}")]
    NotYourTurn { seat: SeatIndex, expected: SeatIndex },

    /// Action not allowed in the current state
    #[error("Illegal action: {0}")]
    IllegalAction(String),

    /// Card index outside the seat's hand
    #[error("Invalid card index {index} for a hand of {hand_size}")]
    InvalidCardIndex { index: usize, hand_size: usize },

    /// Escalation past twelve
    #[error("Truco is already at twelve")]
    LimitReached,

    /// Hand already decided
    #[error("Hand is already complete")]
    HandComplete,

    /// Hand still in play
    #[error("Hand is still in progress")]
    HandInProgress,

    /// A card was lost or duplicated
    #[error("Deck invariant violated: {0}")]
    DeckInvariant(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidSeatCount(_) | GameError::InvalidCardIndex { .. } => {
                ErrorKind::Validation
            }
            GameError::UnknownSeat(_) => ErrorKind::NotFound,
            GameError::NotYourTurn { .. }
            | GameError::IllegalAction(_)
            | GameError::LimitReached
            | GameError::HandComplete
            | GameError::HandInProgress => ErrorKind::Conflict,
            GameError::DeckInvariant(_) => ErrorKind::Integrity,
        }
    }

    /// Message safe to show to a player. Integrity details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            GameError::DeckInvariant(_) => "Internal game error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for rules engine operations
pub type GameResult<T> = Result<T, GameError>;

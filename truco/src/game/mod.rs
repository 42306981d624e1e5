//! Truco rules engine: cards, dealing, tricks, truco escalation and scoring.
//!
//! This module implements:
//! - The 40-card deck with its fixed strength table
//! - A swappable shuffle source (thread RNG, seeded, or none)
//! - [`GameSession`], the per-hand state machine
//! - [`GameView`], the per-seat public projection with other hands hidden
//!
//! Nothing in here performs I/O. Rooms own a session and drive it.

pub mod engine;
pub mod entities;
pub mod errors;
pub mod view;

pub use engine::{GameSession, PendingCall, Phase};
pub use entities::{
    Action, Card, DECK_SIZE, Deck, HAND_SIZE, HandEnd, HandResult, MAX_SEATS, MIN_SEATS,
    NoShuffle, Rank, SeatIndex, SeededShuffle, ShuffleSource, SideId, Suit, ThreadRngShuffle,
    TrickRecord, TrucoLevel, TrucoResponse,
};
pub use errors::{GameError, GameResult};
pub use view::GameView;

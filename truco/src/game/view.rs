use serde::{Deserialize, Serialize};

use super::{
    engine::{GameSession, PendingCall, Phase},
    entities::{Card, HandResult, SeatIndex, TrickRecord, TrucoLevel},
};

/// What one seat is allowed to see of a hand. Other seats' cards are
/// reduced to a count.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameView {
    pub hand_number: u32,
    pub phase: Phase,
    pub dealer: SeatIndex,
    pub current_turn: SeatIndex,
    pub level: TrucoLevel,
    pub pending: Option<PendingCall>,
    pub table: Vec<(SeatIndex, Card)>,
    pub tricks: Vec<TrickRecord>,
    pub trick_wins: Vec<u8>,
    pub scores: Vec<u32>,
    pub hand_sizes: Vec<usize>,
    pub forfeited: Vec<bool>,
    pub seat: Option<SeatIndex>,
    pub hand: Vec<Card>,
    pub result: Option<HandResult>,
}

impl GameSession {
    /// Public state for `viewer`. Spectators (`None`) see no cards in hand.
    pub fn view(&self, viewer: Option<SeatIndex>) -> GameView {
        let hand = viewer
            .map(|seat| self.hand(seat).to_vec())
            .unwrap_or_default();
        GameView {
            hand_number: self.hand_number(),
            phase: self.phase(),
            dealer: self.dealer(),
            current_turn: self.current_turn(),
            level: self.level(),
            pending: self.pending().copied(),
            table: self.table().to_vec(),
            tricks: self.tricks().to_vec(),
            trick_wins: self.trick_wins().to_vec(),
            scores: self.scores().to_vec(),
            hand_sizes: self.hand_sizes(),
            forfeited: self.forfeited().to_vec(),
            seat: viewer,
            hand,
            result: self.result().copied(),
        }
    }
}

//! Truco rules engine.
//!
//! A [`GameSession`] is one dealt hand plus the cumulative score of the room
//! it belongs to. Every operation validates first and mutates second, so a
//! rejected action leaves the session exactly as it was.

use serde::{Deserialize, Serialize};

use super::{
    entities::{
        Action, Card, Deck, HandEnd, HandResult, MAX_SEATS, MIN_SEATS, SeatIndex,
        ShuffleSource, SideId, TRICKS_PER_HAND, TRICKS_TO_WIN, TrickRecord, TrucoLevel,
        TrucoResponse, ensure_full_deck,
    },
    errors::{GameError, GameResult},
};

/// Externally visible state of a hand.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Cards dealt, nobody has acted yet.
    Dealt,
    InTrick,
    AwaitingTrucoResponse,
    HandComplete,
}

/// An unanswered truco call.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PendingCall {
    pub caller: SeatIndex,
    pub caller_side: SideId,
    /// Level the hand moves to if the call is accepted.
    pub proposed: TrucoLevel,
}

#[derive(Clone, Debug)]
pub struct GameSession {
    seat_count: usize,
    dealer: SeatIndex,
    hand_number: u32,
    hands: Vec<Vec<Card>>,
    table: Vec<(SeatIndex, Card)>,
    tricks: Vec<TrickRecord>,
    reserve: Vec<Card>,
    trick_wins: Vec<u8>,
    scores: Vec<u32>,
    current_turn: SeatIndex,
    level: TrucoLevel,
    last_raiser_side: Option<SideId>,
    pending: Option<PendingCall>,
    forfeited: Vec<bool>,
    acted: bool,
    result: Option<HandResult>,
}

impl GameSession {
    /// Shuffle a fresh deck with `source` and deal the first hand.
    ///
    /// The last seat deals, so seat 0 leads the first trick.
    pub fn deal(seat_count: usize, source: &dyn ShuffleSource) -> GameResult<Self> {
        Self::from_deck(seat_count, Deck::shuffled(source), seat_count.saturating_sub(1))
    }

    /// Deal from a deck in a known order.
    pub fn from_deck(seat_count: usize, deck: Deck, dealer: SeatIndex) -> GameResult<Self> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&seat_count) {
            return Err(GameError::InvalidSeatCount(seat_count));
        }
        if dealer >= seat_count {
            return Err(GameError::UnknownSeat(dealer));
        }
        let (hands, reserve) = deck.deal(seat_count)?;
        let side_count = side_count(seat_count);
        let session = Self {
            seat_count,
            dealer,
            hand_number: 1,
            hands,
            table: Vec::with_capacity(seat_count),
            tricks: Vec::with_capacity(TRICKS_PER_HAND),
            reserve,
            trick_wins: vec![0; side_count],
            scores: vec![0; side_count],
            current_turn: (dealer + 1) % seat_count,
            level: TrucoLevel::None,
            last_raiser_side: None,
            pending: None,
            forfeited: vec![false; seat_count],
            acted: false,
            result: None,
        };
        session.check_conservation()?;
        Ok(session)
    }

    /// Start the next hand of the same room. Scores carry over and the
    /// dealer moves one seat to the left.
    pub fn redeal(&mut self, source: &dyn ShuffleSource) -> GameResult<()> {
        self.redeal_from(Deck::shuffled(source))
    }

    pub fn redeal_from(&mut self, deck: Deck) -> GameResult<()> {
        if self.result.is_none() {
            return Err(GameError::HandInProgress);
        }
        if self.forfeited.iter().any(|f| *f) {
            return Err(GameError::IllegalAction(
                "cannot redeal after a seat forfeited".to_string(),
            ));
        }
        let (hands, reserve) = deck.deal(self.seat_count)?;
        let dealer = (self.dealer + 1) % self.seat_count;

        self.dealer = dealer;
        self.hand_number += 1;
        self.hands = hands;
        self.reserve = reserve;
        self.table.clear();
        self.tricks.clear();
        self.trick_wins.iter_mut().for_each(|w| *w = 0);
        self.current_turn = (dealer + 1) % self.seat_count;
        self.level = TrucoLevel::None;
        self.last_raiser_side = None;
        self.pending = None;
        self.acted = false;
        self.result = None;
        self.check_conservation()
    }

    /// Apply a player action on behalf of `seat`.
    pub fn apply(&mut self, seat: SeatIndex, action: Action) -> GameResult<()> {
        match action {
            Action::PlayCard { card_index } => self.play_card(seat, card_index),
            Action::CallTruco => self.call_truco(seat),
            Action::RespondTruco { response } => self.respond_truco(seat, response),
        }
    }

    pub fn play_card(&mut self, seat: SeatIndex, card_index: usize) -> GameResult<()> {
        self.ensure_in_play(seat)?;
        if seat != self.current_turn {
            return Err(GameError::NotYourTurn {
                seat,
                expected: self.current_turn,
            });
        }
        if self.pending.is_some() {
            return Err(GameError::IllegalAction(
                "a truco call is waiting for an answer".to_string(),
            ));
        }
        let hand_size = self.hands[seat].len();
        if card_index >= hand_size {
            return Err(GameError::InvalidCardIndex {
                index: card_index,
                hand_size,
            });
        }

        let card = self.hands[seat].remove(card_index);
        self.table.push((seat, card));
        self.acted = true;

        if self.trick_is_full() {
            self.resolve_trick();
        } else {
            self.current_turn = self.next_active_after(seat);
        }
        self.check_conservation()
    }

    pub fn call_truco(&mut self, seat: SeatIndex) -> GameResult<()> {
        self.ensure_in_play(seat)?;
        if self.pending.is_some() {
            return Err(GameError::IllegalAction(
                "a truco call is already pending".to_string(),
            ));
        }
        if seat != self.current_turn {
            return Err(GameError::IllegalAction(format!(
                "seat {seat} does not hold priority to call truco"
            )));
        }
        let caller_side = self.side_of(seat);
        if self.last_raiser_side == Some(caller_side) {
            return Err(GameError::IllegalAction(
                "the last raise belongs to the caller's side".to_string(),
            ));
        }
        let proposed = self.level.next().ok_or(GameError::LimitReached)?;

        self.pending = Some(PendingCall {
            caller: seat,
            caller_side,
            proposed,
        });
        self.acted = true;
        Ok(())
    }

    pub fn respond_truco(&mut self, seat: SeatIndex, response: TrucoResponse) -> GameResult<()> {
        self.ensure_in_play(seat)?;
        let pending = self
            .pending
            .ok_or_else(|| GameError::IllegalAction("no truco call to answer".to_string()))?;
        let responder_side = self.side_of(seat);
        if responder_side == pending.caller_side {
            return Err(GameError::IllegalAction(
                "a side cannot answer its own call".to_string(),
            ));
        }

        match response {
            TrucoResponse::Accept => {
                self.level = pending.proposed;
                self.last_raiser_side = Some(pending.caller_side);
                self.pending = None;
            }
            TrucoResponse::Raise => {
                let next = pending.proposed.next().ok_or(GameError::LimitReached)?;
                self.level = pending.proposed;
                self.last_raiser_side = Some(pending.caller_side);
                self.pending = Some(PendingCall {
                    caller: seat,
                    caller_side: responder_side,
                    proposed: next,
                });
            }
            TrucoResponse::Fold => {
                self.pending = None;
                self.complete(pending.caller_side, HandEnd::Fold);
            }
        }
        Ok(())
    }

    /// Remove `seat` from the hand. Its cards stay where they are but no
    /// longer compete. If a single side is left it wins the hand.
    pub fn forfeit(&mut self, seat: SeatIndex) -> GameResult<()> {
        self.ensure_in_play(seat)?;
        self.forfeited[seat] = true;
        self.acted = true;

        let remaining = self.active_sides();
        if remaining.len() == 1 {
            self.pending = None;
            self.complete(remaining[0], HandEnd::Forfeit);
            return self.check_conservation();
        }

        if let Some(pending) = self.pending
            && !remaining.contains(&pending.caller_side)
        {
            self.pending = None;
        }

        if self.trick_is_full() {
            self.resolve_trick();
        } else if self.current_turn == seat {
            self.current_turn = self.next_active_after(seat);
        }
        self.check_conservation()
    }

    /// Winning side and stake of a finished hand.
    pub fn settlement_value(&self) -> GameResult<HandResult> {
        self.result.ok_or(GameError::HandInProgress)
    }

    /// Action applied when the acting seat lets its clock run out: the first
    /// responder folds a pending call, otherwise the current seat plays its
    /// weakest card.
    pub fn timeout_action(&self) -> Option<(SeatIndex, Action)> {
        if self.result.is_some() {
            return None;
        }
        if let Some(pending) = self.pending {
            let responder = self.responders(&pending).into_iter().next()?;
            return Some((
                responder,
                Action::RespondTruco {
                    response: TrucoResponse::Fold,
                },
            ));
        }
        let seat = self.current_turn;
        let (card_index, _) = self.hands[seat]
            .iter()
            .enumerate()
            .min_by_key(|(_, card)| card.strength())?;
        Some((seat, Action::PlayCard { card_index }))
    }

    /// Hands, table, completed tricks and reserve must hold the deck exactly once.
    pub fn check_conservation(&self) -> GameResult<()> {
        let cards = self
            .hands
            .iter()
            .flatten()
            .chain(self.table.iter().map(|(_, card)| card))
            .chain(
                self.tricks
                    .iter()
                    .flat_map(|trick| trick.plays.iter().map(|(_, card)| card)),
            )
            .chain(self.reserve.iter());
        ensure_full_deck(cards)
    }

    pub fn phase(&self) -> Phase {
        if self.result.is_some() {
            Phase::HandComplete
        } else if self.pending.is_some() {
            Phase::AwaitingTrucoResponse
        } else if self.acted {
            Phase::InTrick
        } else {
            Phase::Dealt
        }
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Scoring side of `seat`: the team in a 4-seat room, the seat otherwise.
    pub fn side_of(&self, seat: SeatIndex) -> SideId {
        if self.seat_count == 4 { seat % 2 } else { seat }
    }

    pub fn side_count(&self) -> usize {
        side_count(self.seat_count)
    }

    pub fn is_active(&self, seat: SeatIndex) -> bool {
        seat < self.seat_count && !self.forfeited[seat]
    }

    /// Seats allowed to answer `pending`, in turn order after the caller.
    pub fn responders(&self, pending: &PendingCall) -> Vec<SeatIndex> {
        (1..self.seat_count)
            .map(|offset| (pending.caller + offset) % self.seat_count)
            .filter(|seat| self.is_active(*seat) && self.side_of(*seat) != pending.caller_side)
            .collect()
    }

    pub fn seat_count(&self) -> usize {
        self.seat_count
    }

    pub fn dealer(&self) -> SeatIndex {
        self.dealer
    }

    pub fn hand_number(&self) -> u32 {
        self.hand_number
    }

    pub fn current_turn(&self) -> SeatIndex {
        self.current_turn
    }

    pub fn level(&self) -> TrucoLevel {
        self.level
    }

    pub fn pending(&self) -> Option<&PendingCall> {
        self.pending.as_ref()
    }

    pub fn hand(&self, seat: SeatIndex) -> &[Card] {
        self.hands.get(seat).map_or(&[], Vec::as_slice)
    }

    pub fn hand_sizes(&self) -> Vec<usize> {
        self.hands.iter().map(Vec::len).collect()
    }

    pub fn table(&self) -> &[(SeatIndex, Card)] {
        &self.table
    }

    pub fn tricks(&self) -> &[TrickRecord] {
        &self.tricks
    }

    pub fn reserve(&self) -> &[Card] {
        &self.reserve
    }

    pub fn trick_wins(&self) -> &[u8] {
        &self.trick_wins
    }

    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn forfeited(&self) -> &[bool] {
        &self.forfeited
    }

    pub fn result(&self) -> Option<&HandResult> {
        self.result.as_ref()
    }

    fn ensure_in_play(&self, seat: SeatIndex) -> GameResult<()> {
        if self.result.is_some() {
            return Err(GameError::HandComplete);
        }
        if !self.is_active(seat) {
            return Err(GameError::UnknownSeat(seat));
        }
        Ok(())
    }

    fn active_sides(&self) -> Vec<SideId> {
        let mut sides: Vec<SideId> = (0..self.seat_count)
            .filter(|seat| self.is_active(*seat))
            .map(|seat| self.side_of(seat))
            .collect();
        sides.sort_unstable();
        sides.dedup();
        sides
    }

    fn next_active_after(&self, seat: SeatIndex) -> SeatIndex {
        (1..=self.seat_count)
            .map(|offset| (seat + offset) % self.seat_count)
            .find(|candidate| self.is_active(*candidate))
            .unwrap_or(seat)
    }

    fn trick_is_full(&self) -> bool {
        (0..self.seat_count)
            .filter(|seat| self.is_active(*seat))
            .all(|seat| self.table.iter().any(|(played, _)| *played == seat))
    }

    fn resolve_trick(&mut self) {
        let winner = self
            .table
            .iter()
            .filter(|(seat, _)| self.is_active(*seat))
            .max_by_key(|(_, card)| card.strength())
            .map(|(seat, _)| *seat);
        // A full trick always holds a card from an active seat.
        let Some(winner) = winner else {
            return;
        };

        let plays = std::mem::take(&mut self.table);
        self.tricks.push(TrickRecord { plays, winner });
        let side = self.side_of(winner);
        self.trick_wins[side] += 1;

        if self.trick_wins[side] >= TRICKS_TO_WIN {
            self.complete(side, HandEnd::Tricks);
        } else if self.tricks.len() == TRICKS_PER_HAND {
            let side = self.majority_side();
            self.complete(side, HandEnd::Tricks);
        } else {
            self.current_turn = winner;
        }
    }

    /// Side with the most tricks among those still in the hand. Ties go to
    /// the side that won the earliest trick.
    fn majority_side(&self) -> SideId {
        let active = self.active_sides();
        let best = active
            .iter()
            .map(|side| self.trick_wins[*side])
            .max()
            .unwrap_or(0);
        let tied: Vec<SideId> = active
            .into_iter()
            .filter(|side| self.trick_wins[*side] == best)
            .collect();
        self.tricks
            .iter()
            .map(|trick| self.side_of(trick.winner))
            .find(|side| tied.contains(side))
            .or_else(|| tied.first().copied())
            .unwrap_or(0)
    }

    fn complete(&mut self, winning_side: SideId, ended_by: HandEnd) {
        self.scores[winning_side] += self.level.points();
        self.result = Some(HandResult {
            winning_side,
            level: self.level,
            stake_multiplier: self.level.stake_multiplier(),
            ended_by,
        });
        log::debug!(
            "hand {} complete: side {} wins at {} ({:?})",
            self.hand_number,
            winning_side,
            self.level,
            ended_by
        );
    }
}

fn side_count(seat_count: usize) -> usize {
    if seat_count == 4 { 2 } else { seat_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{NoShuffle, Rank, Suit};

    /// Deck whose first cards deal `hands` in seat order.
    fn staged(hands: &[[Card; 3]]) -> Deck {
        let mut cards: Vec<Card> = hands.iter().flatten().copied().collect();
        let rest: Vec<Card> = Deck::default()
            .cards()
            .iter()
            .copied()
            .filter(|c| !cards.contains(c))
            .collect();
        cards.extend(rest);
        Deck::from_cards(cards).unwrap()
    }

    fn card(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    fn two_seat_game() -> GameSession {
        // Seat 0 holds the strongest cards.
        let deck = staged(&[
            [
                card(Rank::Three, Suit::Club),
                card(Rank::Three, Suit::Diamond),
                card(Rank::Two, Suit::Club),
            ],
            [
                card(Rank::Four, Suit::Spade),
                card(Rank::Four, Suit::Heart),
                card(Rank::Five, Suit::Spade),
            ],
        ]);
        GameSession::from_deck(2, deck, 1).unwrap()
    }

    // === Deal Tests ===

    #[test]
    fn test_deal_sets_first_turn_after_dealer() {
        let game = GameSession::deal(3, &NoShuffle).unwrap();
        assert_eq!(game.dealer(), 2);
        assert_eq!(game.current_turn(), 0);
        assert_eq!(game.phase(), Phase::Dealt);
        assert_eq!(game.hand_sizes(), vec![3, 3, 3]);
        assert_eq!(game.reserve().len(), 31);
        assert!(game.check_conservation().is_ok());
    }

    #[test]
    fn test_deal_rejects_seven_seats() {
        assert_eq!(
            GameSession::deal(7, &NoShuffle).unwrap_err(),
            GameError::InvalidSeatCount(7)
        );
    }

    #[test]
    fn test_four_seats_form_two_teams() {
        let game = GameSession::deal(4, &NoShuffle).unwrap();
        assert_eq!(game.side_count(), 2);
        assert_eq!(game.side_of(0), game.side_of(2));
        assert_eq!(game.side_of(1), game.side_of(3));
        assert_ne!(game.side_of(0), game.side_of(1));
    }

    // === Trick Tests ===

    #[test]
    fn test_out_of_turn_play_is_rejected_without_mutation() {
        let mut game = two_seat_game();
        let before = game.hand(1).to_vec();

        let err = game.play_card(1, 0).unwrap_err();
        assert_eq!(err, GameError::NotYourTurn { seat: 1, expected: 0 });
        assert_eq!(game.hand(1), before.as_slice());
        assert!(game.table().is_empty());
        assert_eq!(game.phase(), Phase::Dealt);
    }

    #[test]
    fn test_invalid_card_index() {
        let mut game = two_seat_game();
        assert_eq!(
            game.play_card(0, 3).unwrap_err(),
            GameError::InvalidCardIndex {
                index: 3,
                hand_size: 3
            }
        );
    }

    #[test]
    fn test_highest_card_wins_trick_and_leads_next() {
        let mut game = two_seat_game();
        game.play_card(0, 0).unwrap();
        assert_eq!(game.current_turn(), 1);
        game.play_card(1, 0).unwrap();

        assert_eq!(game.tricks().len(), 1);
        assert_eq!(game.tricks()[0].winner, 0);
        assert_eq!(game.trick_wins(), &[1, 0]);
        assert_eq!(game.current_turn(), 0);
        assert!(game.check_conservation().is_ok());
    }

    #[test]
    fn test_two_tricks_end_the_hand() {
        let mut game = two_seat_game();
        for _ in 0..2 {
            game.play_card(0, 0).unwrap();
            game.play_card(1, 0).unwrap();
        }
        let result = game.settlement_value().unwrap();
        assert_eq!(result.winning_side, 0);
        assert_eq!(result.ended_by, HandEnd::Tricks);
        assert_eq!(result.stake_multiplier, 1);
        assert_eq!(game.scores(), &[1, 0]);
        assert_eq!(game.phase(), Phase::HandComplete);
        assert_eq!(game.play_card(0, 0).unwrap_err(), GameError::HandComplete);
    }

    #[test]
    fn test_split_tricks_go_to_first_trick_winner() {
        // Three seats, each wins one trick.
        let deck = staged(&[
            [
                card(Rank::Three, Suit::Club),
                card(Rank::Four, Suit::Spade),
                card(Rank::Four, Suit::Heart),
            ],
            [
                card(Rank::Five, Suit::Spade),
                card(Rank::Three, Suit::Spade),
                card(Rank::Five, Suit::Heart),
            ],
            [
                card(Rank::Six, Suit::Spade),
                card(Rank::Six, Suit::Heart),
                card(Rank::Three, Suit::Heart),
            ],
        ]);
        let mut game = GameSession::from_deck(3, deck, 2).unwrap();

        // Trick 1: seat 0 wins with 3♣.
        game.play_card(0, 0).unwrap();
        game.play_card(1, 0).unwrap();
        game.play_card(2, 0).unwrap();
        assert_eq!(game.current_turn(), 0);

        // Trick 2: seat 1 wins with 3♠.
        game.play_card(0, 0).unwrap();
        game.play_card(1, 0).unwrap();
        game.play_card(2, 0).unwrap();
        assert_eq!(game.current_turn(), 1);

        // Trick 3: seat 2 wins with 3♥.
        game.play_card(1, 0).unwrap();
        game.play_card(2, 0).unwrap();
        game.play_card(0, 0).unwrap();

        assert_eq!(game.trick_wins(), &[1, 1, 1]);
        assert_eq!(game.settlement_value().unwrap().winning_side, 0);
        assert!(game.check_conservation().is_ok());
    }

    // === Truco Tests ===

    #[test]
    fn test_truco_accept_raises_stake() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        assert_eq!(game.phase(), Phase::AwaitingTrucoResponse);
        assert_eq!(game.level(), TrucoLevel::None);

        game.respond_truco(1, TrucoResponse::Accept).unwrap();
        assert_eq!(game.level(), TrucoLevel::Truco);
        assert_eq!(game.phase(), Phase::InTrick);
        assert_eq!(game.current_turn(), 0);
    }

    #[test]
    fn test_play_blocked_while_call_pending() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        assert!(matches!(
            game.play_card(0, 0),
            Err(GameError::IllegalAction(_))
        ));
    }

    #[test]
    fn test_call_without_priority_is_illegal() {
        let mut game = two_seat_game();
        assert!(matches!(
            game.call_truco(1),
            Err(GameError::IllegalAction(_))
        ));

        game.call_truco(0).unwrap();
        game.respond_truco(1, TrucoResponse::Accept).unwrap();
        // The side that raised last cannot raise again.
        assert!(matches!(
            game.call_truco(0),
            Err(GameError::IllegalAction(_))
        ));
    }

    #[test]
    fn test_caller_cannot_answer_own_call() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        assert!(matches!(
            game.respond_truco(0, TrucoResponse::Accept),
            Err(GameError::IllegalAction(_))
        ));
    }

    #[test]
    fn test_raise_confirms_then_escalates() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        assert_eq!(game.level(), TrucoLevel::Truco);
        let pending = *game.pending().unwrap();
        assert_eq!(pending.caller, 1);
        assert_eq!(pending.proposed, TrucoLevel::Six);

        game.respond_truco(0, TrucoResponse::Accept).unwrap();
        assert_eq!(game.level(), TrucoLevel::Six);
    }

    #[test]
    fn test_fold_pays_confirmed_level() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        // Seat 0 folds the six: seat 1 wins at truco.
        game.respond_truco(0, TrucoResponse::Fold).unwrap();

        let result = game.settlement_value().unwrap();
        assert_eq!(result.winning_side, 1);
        assert_eq!(result.level, TrucoLevel::Truco);
        assert_eq!(result.stake_multiplier, 1);
        assert_eq!(result.ended_by, HandEnd::Fold);
        assert_eq!(game.scores(), &[0, 3]);
    }

    #[test]
    fn test_raise_past_twelve_hits_limit() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        game.respond_truco(0, TrucoResponse::Raise).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        assert_eq!(game.pending().unwrap().proposed, TrucoLevel::Twelve);

        let before = *game.pending().unwrap();
        assert_eq!(
            game.respond_truco(0, TrucoResponse::Raise).unwrap_err(),
            GameError::LimitReached
        );
        assert_eq!(game.pending(), Some(&before));

        game.respond_truco(0, TrucoResponse::Accept).unwrap();
        assert_eq!(game.level(), TrucoLevel::Twelve);
        assert_eq!(game.level().stake_multiplier(), 4);
    }

    #[test]
    fn test_call_at_twelve_hits_limit() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        game.respond_truco(0, TrucoResponse::Raise).unwrap();
        game.respond_truco(1, TrucoResponse::Raise).unwrap();
        game.respond_truco(0, TrucoResponse::Accept).unwrap();

        // Seat 1 raised last, so seat 0 holds priority but nothing is left.
        assert_eq!(game.call_truco(0).unwrap_err(), GameError::LimitReached);
    }

    // === Forfeit and Timeout Tests ===

    #[test]
    fn test_forfeit_with_one_side_left_completes_hand() {
        let mut game = two_seat_game();
        game.forfeit(1).unwrap();
        let result = game.settlement_value().unwrap();
        assert_eq!(result.winning_side, 0);
        assert_eq!(result.ended_by, HandEnd::Forfeit);
    }

    #[test]
    fn test_forfeit_of_current_seat_passes_turn() {
        let mut game = GameSession::deal(3, &NoShuffle).unwrap();
        game.play_card(0, 0).unwrap();
        assert_eq!(game.current_turn(), 1);
        game.forfeit(1).unwrap();
        assert_eq!(game.current_turn(), 2);
        assert!(!game.is_complete());

        game.play_card(2, 0).unwrap();
        assert_eq!(game.tricks().len(), 1);
        assert!(game.tricks()[0].winner != 1);
        assert!(game.check_conservation().is_ok());
    }

    #[test]
    fn test_timeout_plays_weakest_card() {
        let game = two_seat_game();
        let (seat, action) = game.timeout_action().unwrap();
        assert_eq!(seat, 0);
        // 2♣ is the weakest of 3♣ 3♦ 2♣.
        assert_eq!(action, Action::PlayCard { card_index: 2 });
    }

    #[test]
    fn test_timeout_folds_pending_call() {
        let mut game = two_seat_game();
        game.call_truco(0).unwrap();
        let (seat, action) = game.timeout_action().unwrap();
        assert_eq!(seat, 1);
        assert_eq!(
            action,
            Action::RespondTruco {
                response: TrucoResponse::Fold
            }
        );
    }

    #[test]
    fn test_redeal_rotates_dealer_and_keeps_scores() {
        let mut game = two_seat_game();
        assert!(matches!(
            game.redeal(&NoShuffle),
            Err(GameError::HandInProgress)
        ));

        for _ in 0..2 {
            game.play_card(0, 0).unwrap();
            game.play_card(1, 0).unwrap();
        }
        game.redeal(&NoShuffle).unwrap();
        assert_eq!(game.hand_number(), 2);
        assert_eq!(game.dealer(), 0);
        assert_eq!(game.current_turn(), 1);
        assert_eq!(game.scores(), &[1, 0]);
        assert_eq!(game.trick_wins(), &[0, 0]);
        assert_eq!(game.phase(), Phase::Dealt);
        assert!(game.check_conservation().is_ok());
    }
}

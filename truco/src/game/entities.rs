use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self},
    sync::Mutex,
};

use super::errors::{GameError, GameResult};

/// Number of cards in a truco deck (8s, 9s and 10s removed).
pub const DECK_SIZE: usize = 40;

/// Cards dealt to each seat per hand.
pub const HAND_SIZE: usize = 3;

/// Tricks played in a full hand.
pub const TRICKS_PER_HAND: usize = 3;

/// Trick wins that settle a hand early.
pub const TRICKS_TO_WIN: u8 = 2;

pub const MIN_SEATS: usize = 2;
pub const MAX_SEATS: usize = 6;

/// Seat position; also the turn order.
pub type SeatIndex = usize;

/// Scoring side. Team index in 4-seat rooms, the seat itself otherwise.
pub type SideId = usize;

/// Suits in ascending tiebreak order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Spade,
    Heart,
    Diamond,
    Club,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Spade => "♠",
            Self::Heart => "♥",
            Self::Diamond => "♦",
            Self::Club => "♣",
        };
        write!(f, "{repr}")
    }
}

/// Ranks in ascending trick-taking strength.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    Four,
    Five,
    Six,
    Seven,
    Queen,
    Jack,
    King,
    Ace,
    Two,
    Three,
}

impl Rank {
    pub const ALL: [Rank; 10] = [
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Queen,
        Rank::Jack,
        Rank::King,
        Rank::Ace,
        Rank::Two,
        Rank::Three,
    ];
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Queen => "Q",
            Self::Jack => "J",
            Self::King => "K",
            Self::Ace => "A",
            Self::Two => "2",
            Self::Three => "3",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Position in the fixed strength table. Unique per card, so two
    /// different cards never tie.
    pub fn strength(&self) -> u8 {
        self.rank as u8 * 4 + self.suit as u8
    }
}

// Ordering is trick strength: rank first, suit as tiebreak.
impl Ord for Card {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.strength().cmp(&other.strength())
    }
}

impl PartialOrd for Card {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// Randomness used to order the deck before a deal.
pub trait ShuffleSource: Send + Sync {
    fn shuffle(&self, cards: &mut [Card]);
}

/// Uniform shuffle backed by the thread-local RNG.
#[derive(Debug, Default)]
pub struct ThreadRngShuffle;

impl ShuffleSource for ThreadRngShuffle {
    fn shuffle(&self, cards: &mut [Card]) {
        cards.shuffle(&mut rand::rng());
    }
}

/// Reproducible shuffle for simulations and benchmarks.
#[derive(Debug)]
pub struct SeededShuffle {
    rng: Mutex<StdRng>,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ShuffleSource for SeededShuffle {
    fn shuffle(&self, cards: &mut [Card]) {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cards.shuffle(&mut *rng);
    }
}

/// Leaves the deck in the order it was built. Used to stage known hands.
#[derive(Debug, Default)]
pub struct NoShuffle;

impl ShuffleSource for NoShuffle {
    fn shuffle(&self, _cards: &mut [Card]) {}
}

/// A 40-card truco deck. Cards are drawn from the front.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Default for Deck {
    fn default() -> Self {
        let cards = Rank::ALL
            .into_iter()
            .flat_map(|rank| Suit::ALL.into_iter().map(move |suit| Card::new(rank, suit)))
            .collect();
        Self { cards }
    }
}

impl Deck {
    /// Build a deck in a caller-chosen order. The cards must be exactly the
    /// 40-card deck, each once.
    pub fn from_cards(cards: Vec<Card>) -> GameResult<Self> {
        ensure_full_deck(cards.iter())?;
        Ok(Self { cards })
    }

    /// Full deck ordered by `source`.
    pub fn shuffled(source: &dyn ShuffleSource) -> Self {
        let mut deck = Self::default();
        source.shuffle(&mut deck.cards);
        deck
    }

    /// Deal `HAND_SIZE` cards to each seat. Returns the hands and the
    /// undealt reserve.
    pub fn deal(mut self, seat_count: usize) -> GameResult<(Vec<Vec<Card>>, Vec<Card>)> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&seat_count) {
            return Err(GameError::InvalidSeatCount(seat_count));
        }
        let mut hands = Vec::with_capacity(seat_count);
        for _ in 0..seat_count {
            hands.push(self.cards.drain(..HAND_SIZE).collect());
        }
        Ok((hands, self.cards))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

/// Verify `cards` is the full deck with no card lost or duplicated.
pub(crate) fn ensure_full_deck<'a>(cards: impl Iterator<Item = &'a Card>) -> GameResult<()> {
    let mut seen = [false; DECK_SIZE];
    let mut count = 0usize;
    for card in cards {
        let slot = card.strength() as usize;
        if seen[slot] {
            return Err(GameError::DeckInvariant(format!("duplicate card {card}")));
        }
        seen[slot] = true;
        count += 1;
    }
    if count != DECK_SIZE {
        return Err(GameError::DeckInvariant(format!(
            "expected {DECK_SIZE} cards, found {count}"
        )));
    }
    Ok(())
}

/// Stake of the hand. Each step needs the opposing side's consent.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrucoLevel {
    #[default]
    None,
    Truco,
    Six,
    Nine,
    Twelve,
}

impl TrucoLevel {
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Next step, or `None` at twelve.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Truco),
            Self::Truco => Some(Self::Six),
            Self::Six => Some(Self::Nine),
            Self::Nine => Some(Self::Twelve),
            Self::Twelve => None,
        }
    }

    /// Points added to the winning side's running score.
    pub fn points(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Truco => 3,
            Self::Six => 6,
            Self::Nine => 9,
            Self::Twelve => 12,
        }
    }

    /// Wager multiplier applied at settlement.
    pub fn stake_multiplier(self) -> i64 {
        match self {
            Self::None | Self::Truco => 1,
            Self::Six => 2,
            Self::Nine => 3,
            Self::Twelve => 4,
        }
    }

    /// Largest multiplier any hand can reach; bounds the worst-case loss.
    pub fn max_stake_multiplier() -> i64 {
        Self::Twelve.stake_multiplier()
    }
}

impl fmt::Display for TrucoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::None => "none",
            Self::Truco => "truco",
            Self::Six => "six",
            Self::Nine => "nine",
            Self::Twelve => "twelve",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrucoResponse {
    Accept,
    Raise,
    Fold,
}

impl fmt::Display for TrucoResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Accept => "accepts",
            Self::Raise => "raises",
            Self::Fold => "folds",
        };
        write!(f, "{repr}")
    }
}

/// Player action payload, validated before it reaches the engine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    PlayCard { card_index: usize },
    CallTruco,
    RespondTruco { response: TrucoResponse },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PlayCard { card_index } => write!(f, "plays card #{card_index}"),
            Self::CallTruco => write!(f, "calls truco"),
            Self::RespondTruco { response } => write!(f, "{response}"),
        }
    }
}

/// Why a hand ended.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandEnd {
    Tricks,
    Fold,
    Forfeit,
}

/// Final outcome of a hand, used to settle wagers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandResult {
    pub winning_side: SideId,
    pub level: TrucoLevel,
    pub stake_multiplier: i64,
    pub ended_by: HandEnd,
}

/// One resolved trick.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TrickRecord {
    pub plays: Vec<(SeatIndex, Card)>,
    pub winner: SeatIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_table_is_unique() {
        let deck = Deck::default();
        let mut strengths: Vec<u8> = deck.cards().iter().map(Card::strength).collect();
        strengths.sort_unstable();
        strengths.dedup();
        assert_eq!(strengths.len(), DECK_SIZE);
        assert_eq!(strengths.first(), Some(&0));
        assert_eq!(strengths.last(), Some(&39));
    }

    #[test]
    fn test_rank_order_follows_truco_hierarchy() {
        let four = Card::new(Rank::Four, Suit::Club);
        let queen = Card::new(Rank::Queen, Suit::Spade);
        let three = Card::new(Rank::Three, Suit::Spade);
        let two = Card::new(Rank::Two, Suit::Club);
        assert!(four < queen);
        assert!(two < three);
        assert!(Card::new(Rank::Jack, Suit::Club) < Card::new(Rank::King, Suit::Spade));
    }

    #[test]
    fn test_suit_breaks_ties_within_rank() {
        let spade = Card::new(Rank::Ace, Suit::Spade);
        let club = Card::new(Rank::Ace, Suit::Club);
        assert!(spade < club);
        assert!(Card::new(Rank::Ace, Suit::Heart) < Card::new(Rank::Ace, Suit::Diamond));
    }

    #[test]
    fn test_deal_leaves_reserve() {
        let (hands, reserve) = Deck::default().deal(4).unwrap();
        assert_eq!(hands.len(), 4);
        assert!(hands.iter().all(|h| h.len() == HAND_SIZE));
        assert_eq!(reserve.len(), DECK_SIZE - 4 * HAND_SIZE);
    }

    #[test]
    fn test_deal_rejects_bad_seat_count() {
        assert!(matches!(
            Deck::default().deal(7),
            Err(GameError::InvalidSeatCount(7))
        ));
        assert!(matches!(
            Deck::default().deal(1),
            Err(GameError::InvalidSeatCount(1))
        ));
    }

    #[test]
    fn test_from_cards_rejects_duplicates() {
        let mut cards = Deck::default().cards().to_vec();
        cards[1] = cards[0];
        assert!(matches!(
            Deck::from_cards(cards),
            Err(GameError::DeckInvariant(_))
        ));
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let a = Deck::shuffled(&SeededShuffle::new(7));
        let b = Deck::shuffled(&SeededShuffle::new(7));
        assert_eq!(a.cards(), b.cards());
        assert!(ensure_full_deck(a.cards().iter()).is_ok());
    }

    #[test]
    fn test_truco_levels_escalate_to_twelve() {
        let mut level = TrucoLevel::None;
        let mut steps = 0;
        while let Some(next) = level.next() {
            assert!(next > level);
            level = next;
            steps += 1;
        }
        assert_eq!(steps, 4);
        assert_eq!(level, TrucoLevel::Twelve);
        assert_eq!(TrucoLevel::max_stake_multiplier(), 4);
    }

    #[test]
    fn test_action_payload_is_tagged() {
        let json = serde_json::to_string(&Action::PlayCard { card_index: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"play_card","card_index":2}"#);

        let parsed: Action =
            serde_json::from_str(r#"{"type":"respond_truco","response":"raise"}"#).unwrap();
        assert_eq!(
            parsed,
            Action::RespondTruco {
                response: TrucoResponse::Raise
            }
        );
    }
}

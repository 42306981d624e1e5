//! Room data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{
    game::{HandEnd, SeatIndex, SideId, TrucoLevel},
    wallet::{Amount, UserId},
};

/// Room ID type
pub type RoomId = i64;

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "playing" => Ok(RoomStatus::Playing),
            "finished" => Ok(RoomStatus::Finished),
            other => Err(format!("unknown room status {other:?}")),
        }
    }
}

/// One occupied seat. The seat index is the turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub seat: SeatIndex,
    pub user_id: UserId,
    pub forfeited: bool,
}

/// Room model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub creator_id: UserId,
    pub max_seats: usize,
    pub wager: Amount,
    pub is_private: bool,
    /// Argon2id hash of the room secret (private rooms)
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    /// Shareable 6-character code (private rooms)
    pub invite_code: Option<String>,
    pub seats: Vec<SeatAssignment>,
    pub status: RoomStatus,
    /// Hands completed so far
    pub hands_played: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn seat_of(&self, user_id: UserId) -> Option<SeatIndex> {
        self.seats
            .iter()
            .find(|s| s.user_id == user_id)
            .map(|s| s.seat)
    }

    pub fn user_at(&self, seat: SeatIndex) -> Option<UserId> {
        self.seats.iter().find(|s| s.seat == seat).map(|s| s.user_id)
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.max_seats
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            creator_id: self.creator_id,
            max_seats: self.max_seats,
            seated: self.seats.len(),
            wager: self.wager,
            is_private: self.is_private,
            status: self.status,
            hands_played: self.hands_played,
            created_at: self.created_at,
        }
    }
}

/// Room about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub creator_id: UserId,
    pub max_seats: usize,
    pub wager: Amount,
    pub is_private: bool,
    pub secret_hash: Option<String>,
    pub invite_code: Option<String>,
}

/// Room listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub creator_id: UserId,
    pub max_seats: usize,
    pub seated: usize,
    pub wager: Amount,
    pub is_private: bool,
    pub status: RoomStatus,
    pub hands_played: u32,
    pub created_at: DateTime<Utc>,
}

/// Record of one settled hand. Unique per (room, hand number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHistory {
    pub room_id: RoomId,
    pub hand_number: u32,
    pub winning_side: SideId,
    pub winners: Vec<UserId>,
    pub losers: Vec<UserId>,
    pub level: TrucoLevel,
    pub stake_multiplier: i64,
    pub wager: Amount,
    pub ended_by: HandEnd,
    /// When the hand was dealt
    pub started_at: DateTime<Utc>,
    /// Deal to settlement
    pub duration_ms: i64,
    pub recorded_at: DateTime<Utc>,
}

impl GameHistory {
    /// Idempotency key for one user's settlement of this hand.
    pub fn settlement_key(&self, user_id: UserId) -> String {
        settlement_key(self.room_id, self.hand_number, user_id)
    }
}

pub fn settlement_key(room_id: RoomId, hand_number: u32, user_id: UserId) -> String {
    format!("settle_{room_id}_{hand_number}_{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [RoomStatus::Waiting, RoomStatus::Playing, RoomStatus::Finished] {
            assert_eq!(status.as_str().parse::<RoomStatus>().unwrap(), status);
        }
        assert!("open".parse::<RoomStatus>().is_err());
    }

    #[test]
    fn test_settlement_key_format() {
        assert_eq!(settlement_key(3, 2, 42), "settle_3_2_42");
    }

    #[test]
    fn test_secret_hash_is_not_serialized() {
        let room = Room {
            id: 1,
            name: "mesa".to_string(),
            creator_id: 1,
            max_seats: 2,
            wager: 10,
            is_private: true,
            secret_hash: Some("$argon2id$...".to_string()),
            invite_code: Some("ABC123".to_string()),
            seats: vec![],
            status: RoomStatus::Waiting,
            hands_played: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&room).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("ABC123"));
    }
}

//! Room configuration and creation requests.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    db::retry::RetryPolicy,
    env::env_or,
    game::{MAX_SEATS, MIN_SEATS},
    wallet::{Amount, UserId},
};

/// Maximum room name length in characters
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Session manager configuration shared by every room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Hands dealt before a room finishes (default: 1)
    pub hands_per_room: u32,

    /// Time a seat has to act before the implicit action is applied
    pub turn_timeout: Duration,

    /// Waiting rooms idle longer than this are collected
    pub idle_ttl: Duration,

    /// How often each room checks its turn clock
    pub tick_interval: Duration,

    /// Retry policy for room and history writes
    pub retry: RetryPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            hands_per_room: 1,
            turn_timeout: Duration::from_secs(30),
            idle_ttl: Duration::from_secs(600),
            tick_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl RoomConfig {
    /// Create configuration from environment variables
    ///
    /// - `ROOM_HANDS_PER_ROOM` (default: 1)
    /// - `ROOM_TURN_TIMEOUT_SECS` (default: 30)
    /// - `ROOM_IDLE_TTL_SECS` (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hands_per_room: env_or("ROOM_HANDS_PER_ROOM", defaults.hands_per_room),
            turn_timeout: Duration::from_secs(env_or(
                "ROOM_TURN_TIMEOUT_SECS",
                defaults.turn_timeout.as_secs(),
            )),
            idle_ttl: Duration::from_secs(env_or(
                "ROOM_IDLE_TTL_SECS",
                defaults.idle_ttl.as_secs(),
            )),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hands_per_room == 0 {
            return Err("A room must play at least one hand".to_string());
        }
        if self.turn_timeout.is_zero() {
            return Err("Turn timeout must be positive".to_string());
        }
        if self.tick_interval.is_zero() {
            return Err("Tick interval must be positive".to_string());
        }
        Ok(())
    }
}

/// Parameters for a new room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub creator_id: UserId,
    pub max_seats: usize,
    /// Stake per hand in minor units
    pub wager: Amount,
    #[serde(default)]
    pub is_private: bool,
    /// Required for private rooms
    #[serde(default)]
    pub secret: Option<String>,
}

impl CreateRoomRequest {
    /// Validate request fields. Nothing is persisted before this passes.
    pub fn validate(&self) -> Result<(), String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Room name is required".to_string());
        }
        if name.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(format!(
                "Room name must be at most {MAX_ROOM_NAME_LEN} characters"
            ));
        }
        if !(MIN_SEATS..=MAX_SEATS).contains(&self.max_seats) {
            return Err(format!(
                "Max seats must be between {MIN_SEATS} and {MAX_SEATS}"
            ));
        }
        if self.wager <= 0 {
            return Err("Wager must be positive".to_string());
        }
        match (&self.secret, self.is_private) {
            (None, true) => Err("Private rooms require a secret".to_string()),
            (Some(secret), true) if secret.is_empty() => {
                Err("Private rooms require a secret".to_string())
            }
            (Some(_), false) => Err("Only private rooms take a secret".to_string()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn request() -> CreateRoomRequest {
        CreateRoomRequest {
            name: "mesa 1".to_string(),
            creator_id: 1,
            max_seats: 2,
            wager: 10,
            is_private: false,
            secret: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_seat_counts() {
        for max_seats in [0, 1, 7] {
            let req = CreateRoomRequest {
                max_seats,
                ..request()
            };
            assert!(req.validate().is_err(), "{max_seats} seats accepted");
        }
    }

    #[test]
    fn test_rejects_blank_name_and_zero_wager() {
        let blank = CreateRoomRequest {
            name: "   ".to_string(),
            ..request()
        };
        assert!(blank.validate().is_err());

        let free = CreateRoomRequest {
            wager: 0,
            ..request()
        };
        assert!(free.validate().is_err());
    }

    #[test]
    fn test_private_room_needs_secret() {
        let private = CreateRoomRequest {
            is_private: true,
            ..request()
        };
        assert!(private.validate().is_err());

        let with_secret = CreateRoomRequest {
            is_private: true,
            secret: Some("hunter2".to_string()),
            ..request()
        };
        assert!(with_secret.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        // SAFETY: serialized with the other env tests
        unsafe {
            std::env::set_var("ROOM_HANDS_PER_ROOM", "3");
            std::env::set_var("ROOM_TURN_TIMEOUT_SECS", "12");
        }
        let config = RoomConfig::from_env();
        unsafe {
            std::env::remove_var("ROOM_HANDS_PER_ROOM");
            std::env::remove_var("ROOM_TURN_TIMEOUT_SECS");
        }
        assert_eq!(config.hands_per_room, 3);
        assert_eq!(config.turn_timeout, Duration::from_secs(12));
        assert_eq!(config.idle_ttl, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }
}

//! Session manager: room lifecycle and one game session per active room.
//!
//! Each room is owned by a [`RoomActor`] task that applies joins, starts,
//! actions and departures one at a time, so a start racing a join deals
//! exactly the seats present when the start was accepted. When a hand ends
//! the actor settles every seat through the wallet before replying.
//!
//! Lifecycle: `Waiting -> Playing -> Finished`.

pub mod actor;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod models;
pub mod secret;
pub mod settlement;

pub use actor::{RoomActor, RoomContext, RoomHandle};
pub use config::{CreateRoomRequest, RoomConfig};
pub use errors::{RoomError, RoomResult};
pub use manager::RoomManager;
pub use messages::{
    ActionOutcome, HandSettlement, RoomMessage, RoomStateResponse, SettlementStatus,
};
pub use models::{
    GameHistory, NewRoom, Room, RoomId, RoomStatus, RoomSummary, SeatAssignment, settlement_key,
};
pub use settlement::{
    PendingSettlement, RejectedSettlement, SettlementEntry, SettlementQueue, StakeHold,
};

//! Room actor message types.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{
    errors::RoomResult,
    models::{Room, RoomStatus, RoomSummary, SeatAssignment},
};
use crate::{
    game::{Action, GameView, HandResult, SeatIndex},
    wallet::UserId,
};

/// Messages that can be sent to a RoomActor
#[derive(Debug)]
pub enum RoomMessage {
    /// Take the next free seat
    Join {
        user_id: UserId,
        secret: Option<String>,
        response: oneshot::Sender<RoomResult<Room>>,
    },

    /// Give up a seat (forfeits it once the game started)
    Leave {
        user_id: UserId,
        response: oneshot::Sender<RoomResult<Room>>,
    },

    /// Deal the first hand
    Start {
        requester: UserId,
        response: oneshot::Sender<RoomResult<GameView>>,
    },

    /// Player action on behalf of `seat`
    Act {
        user_id: UserId,
        seat: SeatIndex,
        action: Action,
        response: oneshot::Sender<RoomResult<ActionOutcome>>,
    },

    /// Get current room state
    GetState {
        viewer: Option<UserId>,
        response: oneshot::Sender<RoomStateResponse>,
    },

    /// Stop the actor if nothing is in play and it has been idle past the
    /// TTL. Answers with the final status when it stopped.
    CloseIfIdle {
        response: oneshot::Sender<Option<RoomStatus>>,
    },

    /// Stop the actor
    Close { response: oneshot::Sender<()> },
}

/// How a finished hand was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Ledger and history written before this response
    Applied,
    /// Queued for retry after a transient failure
    Queued,
    /// Failed for a reason a retry cannot fix; kept for an operator
    Rejected,
}

/// Settlement of one hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandSettlement {
    pub hand_number: u32,
    pub result: HandResult,
    pub winners: Vec<UserId>,
    pub losers: Vec<UserId>,
    pub status: SettlementStatus,
}

/// Response to an accepted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// State as seen by the acting seat
    pub view: GameView,
    pub room_status: RoomStatus,
    /// Present when the action ended a hand
    pub settlement: Option<HandSettlement>,
}

/// Room state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStateResponse {
    pub room: RoomSummary,
    pub seats: Vec<SeatAssignment>,
    /// Viewer's seat, if seated
    pub seat: Option<SeatIndex>,
    /// Game state from the viewer's seat (hands of other seats hidden)
    pub game: Option<GameView>,
}

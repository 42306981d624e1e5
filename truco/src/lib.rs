//! # Truco
//!
//! Real-money truco rooms: a rules engine, a double-entry style wallet
//! ledger, room actors that settle each hand, and a webhook reconciler that
//! turns payment notifications into idempotent credits.
//!
//! ## Architecture
//!
//! - [`game`]: deck, dealing, tricks, truco escalation and scoring. Pure,
//!   no I/O.
//! - [`wallet`]: append-only transaction log with per-user serialized
//!   balance changes and external-reference idempotency.
//! - [`room`]: one actor per room owns its seats and game session; the
//!   [`room::RoomManager`] spawns and addresses them.
//! - [`payment`]: deposit intents and the webhook reconciler.
//! - [`db`]: repository traits with PostgreSQL and in-memory stores.
//! - [`bootstrap`]: wires everything over one store for a host process.
//!
//! ## Example
//!
//! ```
//! use truco::game::{Action, GameSession, SeededShuffle};
//!
//! let mut session = GameSession::deal(2, &SeededShuffle::new(1)).unwrap();
//! let seat = session.current_turn();
//! session.apply(seat, Action::PlayCard { card_index: 0 }).unwrap();
//! ```

pub mod bootstrap;
pub mod db;
mod env;
pub mod errors;
pub mod game;
pub mod locks;
pub mod payment;
pub mod room;
pub mod wallet;

pub use bootstrap::{Backend, BootstrapError, MaintenanceReport, Services, ServicesConfig};
pub use errors::ErrorKind;

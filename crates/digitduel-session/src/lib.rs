//! Session layer for DigitDuel.
//!
//! This crate sits between the transport (WebSocket frames in/out) and the
//! room model (pure game rules):
//!
//! ```text
//! Transport (above)  ← decodes ClientEvent, hands it to the SessionManager
//!     ↕
//! Session layer (this crate)  ← transitions, turn timers, idle sweep
//!     ↕
//! Room layer (below)  ← Room, RoomRegistry, game rules
//! ```
//!
//! Every client event becomes one [`SessionManager`] call that runs under
//! the owning room's lock and returns the [`Outbound`] messages it
//! produced. The caller delivers them through a [`Broadcaster`] *after*
//! the lock is gone, so a slow socket can never stall the game state.
//! The turn-timeout and idle-sweep tasks live here too; they deliver
//! through the same `Broadcaster` on their own.

mod config;
mod dispatch;
mod manager;

pub use config::SessionConfig;
pub use dispatch::{dispatch, Broadcaster, Outbound};
pub use manager::{JoinOutcome, SessionManager};

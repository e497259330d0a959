//! Room model and game rules for DigitDuel.
//!
//! This crate owns everything about a single game: the digit-matching rule,
//! the [`Room`] data structure with its phase machine, and the
//! [`RoomRegistry`] that maps live room codes to shared room handles.
//!
//! Nothing here does I/O. Transitions are plain synchronous methods that
//! either mutate the room or return a typed [`GameError`]; the session layer
//! wraps them in the per-room lock and turns the results into wire events.
//!
//! # Key types
//!
//! - [`Room`] — one game: two seats, secrets, histories, turn state
//! - [`Phase`] — `WaitingForSecrets → Ready → InProgress → Finished`
//! - [`RoomRegistry`] — concurrent code → room map with idle sweeping
//! - [`GameError`] — every way a client request can be rejected

mod config;
mod error;
mod logic;
mod registry;
mod room;

pub use config::{
    DIGIT_COUNT, MAX_SECRET, MIN_SECRET, ROOM_CODE_LENGTH, TOKEN_LENGTH,
};
pub use error::{GameError, RegistryError};
pub use logic::{exact_matches, validate_number};
pub use registry::{ExpiredRoom, RoomRegistry, SharedRoom};
pub use room::{GuessOutcome, Phase, Room, Seat};

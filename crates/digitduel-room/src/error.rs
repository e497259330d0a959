//! Error types for the room layer.
//!
//! [`GameError`] is the full taxonomy of ways a client request can be
//! rejected. Every variant maps to an `error` event sent back to the acting
//! connection only; none of them mutate or crash a room. The display
//! strings are the human-readable messages the client shows verbatim.

use digitduel_protocol::Slot;

use crate::config::{DIGIT_COUNT, MAX_SECRET, MIN_SECRET};

/// A rejected game request. Always leaves the room unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The referenced room does not exist (or has been swept).
    #[error("Room not found.")]
    NotFound,

    /// The requested seat is held by a different live connection.
    #[error("Player {0} slot already taken.")]
    SlotConflict(Slot),

    /// A slot number outside {1, 2}.
    #[error("Invalid player number.")]
    InvalidSlot(u8),

    /// A secret or guess that fails the 4-digit range check.
    /// `what` is "Secret" or "Guess", matching the client-facing wording.
    #[error("{what} must be a {DIGIT_COUNT}-digit number between {MIN_SECRET} and {MAX_SECRET}.")]
    Validation { what: &'static str },

    /// The action is not legal in the room's current phase.
    #[error("{0}")]
    IllegalPhase(String),

    /// A guess submitted by the seat that is not on turn.
    #[error("Not your turn. Player {0}'s turn.")]
    NotYourTurn(Slot),

    /// The acting connection does not own the claimed seat, or presented
    /// a token that matches no seat in the room.
    #[error("Unauthorized player.")]
    Unauthorized,
}

impl GameError {
    /// Shorthand for phase violations with a client-facing message.
    pub fn illegal_phase(message: impl Into<String>) -> GameError {
        GameError::IllegalPhase(message.into())
    }
}

/// Errors from the registry itself, as opposed to game-rule rejections.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Could not find a free room code. With a 36^6 code space this means
    /// the generator is broken or the server is absurdly overloaded — it
    /// indicates a bug, not bad input, so callers should fail loudly.
    #[error("room code space exhausted after {0} attempts")]
    CodesExhausted(u32),
}

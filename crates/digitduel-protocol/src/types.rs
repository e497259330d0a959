//! Core protocol types for DigitDuel's wire format.
//!
//! These are the structures that get serialized to JSON text, sent over the
//! connection, and deserialized on the other side. The event names and
//! payload shapes are the contract with the browser client.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// One of the two player positions in a room.
///
/// A slot is a *seat*, not a connection: the same seat can be driven by
/// different physical connections over its lifetime (reconnection), and a
/// connection can be kicked off a seat without the seat losing its state.
///
/// Serialized as the plain numbers `1` and `2` so the client never deals
/// with enum names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Slot {
    One = 1,
    Two = 2,
}

impl Slot {
    /// The seat on the other side of the table.
    pub fn opponent(self) -> Slot {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }

    /// Zero-based index, for indexing a two-element seat array.
    pub fn index(self) -> usize {
        match self {
            Slot::One => 0,
            Slot::Two => 1,
        }
    }

    /// Both slots, in order.
    pub const ALL: [Slot; 2] = [Slot::One, Slot::Two];
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot as u8
    }
}

impl TryFrom<u8> for Slot {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Slot, ProtocolError> {
        match value {
            1 => Ok(Slot::One),
            2 => Ok(Slot::Two),
            other => Err(ProtocolError::InvalidSlot(other)),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// A room's public, human-shareable code (e.g. `"K3QX7P"`).
///
/// Codes are normalized to uppercase on construction so that lookups are
/// case-insensitive from the client's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes raw client input into a room code (trim + uppercase).
    pub fn new(raw: impl AsRef<str>) -> RoomCode {
        RoomCode(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier for a single physical connection.
///
/// Assigned by the server when a socket is accepted; never reused within a
/// process. Not part of the wire format — clients are addressed by it but
/// never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> ConnectionId {
        ConnectionId(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// State snapshot payloads
// ---------------------------------------------------------------------------

/// One guess and its outcome description, as shown in a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessEntry {
    pub guess: String,
    pub outcome: String,
}

/// A pair of values keyed by slot, serialized as `{"1": ..., "2": ...}`.
///
/// The string keys match what the original web client expects for the
/// `finished` and `history` maps in a `state` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerSlot<T> {
    #[serde(rename = "1")]
    pub one: T,
    #[serde(rename = "2")]
    pub two: T,
}

impl<T> PerSlot<T> {
    pub fn get(&self, slot: Slot) -> &T {
        match slot {
            Slot::One => &self.one,
            Slot::Two => &self.two,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut T {
        match slot {
            Slot::One => &mut self.one,
            Slot::Two => &mut self.two,
        }
    }
}

/// Which seats have set their secret — drives the lobby "ready" lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Readiness {
    pub slot1_set: bool,
    pub slot2_set: bool,
}

/// The public view of a room, safe to broadcast to both players.
///
/// Never contains a secret: outcomes expose only positional match counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub started: bool,
    pub current_turn: Slot,
    pub finished: PerSlot<bool>,
    pub history: PerSlot<Vec<GuessEntry>>,
    pub readiness: Readiness,
    /// Wall-clock deadline for the current turn (ms since the Unix epoch),
    /// absent when turn timeouts are disabled or the game is not running.
    pub turn_deadline_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// ClientEvent — inbound
// ---------------------------------------------------------------------------

/// Everything a client can ask the server to do.
///
/// `slot` travels as a raw `u8` here (not [`Slot`]) so that an out-of-range
/// value reaches the session layer and comes back as a typed `InvalidSlot`
/// error instead of a decode failure the client can't distinguish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask for a fresh room. Replies with `room_created`.
    CreateRoom,

    /// Take a seat in a room, or reclaim one with a reconnect token.
    /// When a valid `token` is presented, `slot` is ignored — the token
    /// decides which seat is reclaimed.
    JoinRoom {
        room_id: String,
        #[serde(default)]
        slot: Option<u8>,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },

    /// Release the connection from a seat (the seat identity survives).
    LeaveRoom { room_id: String, slot: u8 },

    /// Set this seat's secret number. Only legal before the game starts.
    SetSecret {
        room_id: String,
        slot: u8,
        secret: String,
    },

    /// Clear a previously set secret. Only legal before the game starts.
    ResetSecret { room_id: String, slot: u8 },

    /// Start the game once both secrets are set.
    StartGame { room_id: String },

    /// Guess the opponent's secret. Only legal on this seat's turn.
    SubmitGuess {
        room_id: String,
        slot: u8,
        guess: String,
    },

    /// Reset the room for a rematch, keeping seats and tokens.
    NewGame { room_id: String },
}

// ---------------------------------------------------------------------------
// ServerEvent — outbound
// ---------------------------------------------------------------------------

/// Everything the server can tell a client.
///
/// Some variants are addressed to a single connection (`joined` carries a
/// credential, `error` is always private); the rest are room broadcasts.
/// The session layer decides the audience — the type does not encode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomCreated {
        room_id: RoomCode,
    },

    /// Sent only to the joining connection: the token is the seat's
    /// reconnect credential and must never be broadcast.
    Joined {
        room_id: RoomCode,
        slot: Slot,
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Human-readable room notice ("Player 1 joined.", "Player 2 timed out.").
    System {
        message: String,
    },

    SecretAck {
        slot: Slot,
    },

    State(StateSnapshot),

    GameStarted {
        current_turn: Slot,
        turn_deadline_ms: Option<u64>,
    },

    GuessResult {
        slot: Slot,
        guess: String,
        outcome: String,
    },

    Turn {
        current_turn: Slot,
    },

    GameOver {
        winner: Slot,
        message: String,
    },

    NewGameStarted,

    /// Sent to still-connected clients just before an idle room is removed.
    RoomExpired {
        message: String,
    },

    /// Sent to the acting connection only, never broadcast.
    Error {
        message: String,
    },
}

// =========================================================================
// Tests
// =========================================================================

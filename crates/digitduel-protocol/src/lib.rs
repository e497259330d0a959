//! Wire protocol for DigitDuel.
//!
//! This crate defines everything that travels between a game client and the
//! server: the inbound [`ClientEvent`]s, the outbound [`ServerEvent`]s, the
//! identity newtypes ([`Slot`], [`RoomCode`], [`ConnectionId`]), and the
//! [`Codec`] used to turn events into JSON text frames.
//!
//! Every event is a single JSON object tagged by an `"event"` field, e.g.
//!
//! ```json
//! { "event": "submit_guess", "room_id": "K3QX7P", "slot": 1, "guess": "1234" }
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientEvent, ConnectionId, GuessEntry, PerSlot, Readiness, RoomCode,
    ServerEvent, Slot, StateSnapshot,
};

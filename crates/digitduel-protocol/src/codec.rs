//! Codec trait and the JSON text implementation.
//!
//! The session layer never touches serialization directly — it hands typed
//! events to a [`Codec`] and ships the resulting text frame. Keeping the
//! trait around means a binary codec could be swapped in without touching
//! the session or gateway code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts protocol types to and from text frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a value from a text frame.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// JSON text codec — one event object per WebSocket text frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value)
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

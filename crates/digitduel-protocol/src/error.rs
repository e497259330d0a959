//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("failed to encode event: {0}")]
    Encode(String),

    /// Deserialization failed — malformed frame or unknown event.
    #[error("failed to decode event: {0}")]
    Decode(String),

    /// A slot number outside {1, 2}.
    #[error("invalid slot number: {0}")]
    InvalidSlot(u8),
}

//! Unified error type for the server crate.

use digitduel_protocol::ProtocolError;
use digitduel_room::{GameError, RegistryError};

/// Top-level error that wraps the sub-crate errors plus transport I/O.
///
/// The `#[from]` attributes let `?` convert sub-crate errors
/// automatically at the server boundary.
#[derive(Debug, thiserror::Error)]
pub enum DigitDuelError {
    /// Encode/decode failure on the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game-rule violation that escaped the per-event error path.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Room registry failure (code space exhausted).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Socket-level failure (bind, accept).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_game_error_keeps_message() {
        let err: DigitDuelError = GameError::NotFound.into();
        assert!(matches!(err, DigitDuelError::Game(_)));
        assert_eq!(err.to_string(), "Room not found.");
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DigitDuelError = ProtocolError::InvalidSlot(7).into();
        assert!(matches!(err, DigitDuelError::Protocol(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: DigitDuelError = io.into();
        assert!(err.to_string().contains("busy"));
    }
}

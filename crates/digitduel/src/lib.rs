//! # DigitDuel
//!
//! WebSocket server for a two-player duel: each player locks in a secret
//! 4-digit number, then the players take turns guessing each other's. A
//! guess comes back as the count of exact positional digit matches; four
//! out of four wins.
//!
//! This crate is the outer shell. It accepts WebSocket connections,
//! decodes `ClientEvent` frames, hands them to the session layer, and
//! fans the resulting `ServerEvent`s back out:
//!
//! ```text
//! client ⇄ WebSocket ⇄ handler ⇄ SessionManager ⇄ Room / RoomRegistry
//!                         ↑              │
//!                     WsGateway ←────────┘  (broadcast fan-out)
//! ```
//!
//! Run it with [`DigitDuelServer::builder`], or through the `digitduel`
//! binary which reads its configuration from the environment.

mod error;
mod gateway;
mod handler;
mod server;

pub use error::DigitDuelError;
pub use gateway::WsGateway;
pub use server::{DigitDuelServer, DigitDuelServerBuilder};

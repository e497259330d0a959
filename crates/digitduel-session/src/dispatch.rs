//! Outbound message routing.
//!
//! Transitions run under a room lock and must not block on socket writes,
//! so they describe what to send as [`Outbound`] values. The caller hands
//! those to a [`Broadcaster`] once the lock is released.

use digitduel_protocol::{ConnectionId, RoomCode, ServerEvent};

/// One message produced by a transition, with its delivery scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// To a single connection (tokens, acks, errors).
    Direct(ConnectionId, ServerEvent),
    /// To every connection subscribed to a room.
    Room(RoomCode, ServerEvent),
}

/// Delivers events to connections. Implemented by the WebSocket gateway;
/// tests substitute a recorder.
///
/// Implementations must be cheap and non-blocking — the timer and sweep
/// tasks call these directly, and the handler calls them right after
/// releasing a room lock.
pub trait Broadcaster: Send + Sync + 'static {
    /// Delivers to one connection. Unknown ids are dropped silently.
    fn send(&self, conn: ConnectionId, event: ServerEvent);

    /// Delivers to every current subscriber of `room`.
    fn broadcast(&self, room: &RoomCode, event: ServerEvent);

    /// Discards all subscription state for a room that no longer exists.
    fn forget_room(&self, room: &RoomCode);
}

/// Sends a batch of transition output through the broadcaster, in order.
pub fn dispatch(broadcaster: &dyn Broadcaster, events: Vec<Outbound>) {
    for event in events {
        match event {
            Outbound::Direct(conn, ev) => broadcaster.send(conn, ev),
            Outbound::Room(room, ev) => broadcaster.broadcast(&room, ev),
        }
    }
}

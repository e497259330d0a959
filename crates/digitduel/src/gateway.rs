//! Connection fan-out: the [`Broadcaster`] the session layer talks to.
//!
//! The gateway owns two maps: connection → writer channel, and room code
//! → subscribed connections. Frames
//! go out through per-connection unbounded channels, so a broadcast never
//! awaits a slow socket — each connection's writer task drains its own
//! queue at its own pace.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use digitduel_protocol::{Codec, ConnectionId, JsonCodec, RoomCode, ServerEvent};
use digitduel_session::Broadcaster;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace};

type FrameSender = UnboundedSender<Message>;

#[derive(Default)]
pub struct WsGateway {
    codec: JsonCodec,
    conns: Mutex<HashMap<ConnectionId, FrameSender>>,
    rooms: Mutex<HashMap<RoomCode, HashSet<ConnectionId>>>,
}

impl WsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a connection reachable. Must precede any subscribe.
    pub fn register(&self, conn: ConnectionId, sender: FrameSender) {
        lock(&self.conns).insert(conn, sender);
    }

    /// Drops a connection and every room membership it still has.
    /// Closing its channel also ends the connection's writer task.
    pub fn unregister(&self, conn: ConnectionId) {
        lock(&self.conns).remove(&conn);
        let mut rooms = lock(&self.rooms);
        rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    pub fn subscribe(&self, room: &RoomCode, conn: ConnectionId) {
        lock(&self.rooms).entry(room.clone()).or_default().insert(conn);
    }

    pub fn unsubscribe(&self, room: &RoomCode, conn: ConnectionId) {
        let mut rooms = lock(&self.rooms);
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    fn frame(&self, event: &ServerEvent) -> Option<Message> {
        match self.codec.encode(event) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                // An unencodable ServerEvent is a programming error.
                error!(error = %e, "dropping unencodable event");
                None
            }
        }
    }

    fn push(&self, conn: ConnectionId, frame: Message) {
        if let Some(sender) = lock(&self.conns).get(&conn) {
            // A closed channel means the writer task is gone and the
            // connection is being torn down; nothing left to deliver.
            if sender.send(frame).is_err() {
                trace!(%conn, "dropping frame for closing connection");
            }
        }
    }
}

impl Broadcaster for WsGateway {
    fn send(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(frame) = self.frame(&event) {
            self.push(conn, frame);
        }
    }

    fn broadcast(&self, room: &RoomCode, event: ServerEvent) {
        let members: Vec<ConnectionId> = match lock(&self.rooms).get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        let Some(frame) = self.frame(&event) else {
            return;
        };
        for conn in members {
            self.push(conn, frame.clone());
        }
    }

    fn forget_room(&self, room: &RoomCode) {
        if lock(&self.rooms).remove(room).is_some() {
            debug!(%room, "room subscriptions dropped");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("gateway lock poisoned")
}

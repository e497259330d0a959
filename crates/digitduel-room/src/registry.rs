//! The shared map of live rooms.
//!
//! Rooms are handed out as `Arc<Mutex<Room>>` so callers can take the room
//! lock without holding the registry lock. Lock order is always registry
//! map first, then room — never the reverse — which [`RoomRegistry::sweep`]
//! relies on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use digitduel_protocol::{ConnectionId, RoomCode};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::logic::gen_room_code;
use crate::room::Room;

/// A room behind its own lock, shareable across tasks.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Code generation retry cap. With 36^6 possible codes this only trips
/// when the registry is pathologically full.
const CREATE_ATTEMPTS: u32 = 64;

/// A room evicted by [`RoomRegistry::sweep`], with the connections that
/// were still bound to it when it went.
#[derive(Debug)]
pub struct ExpiredRoom {
    pub code: RoomCode,
    pub connections: Vec<ConnectionId>,
}

/// Owns every live room, keyed by room code.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomCode, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> RoomRegistry {
        RoomRegistry::default()
    }

    /// Creates a room under a freshly generated unique code.
    pub fn create(&self) -> Result<(RoomCode, SharedRoom), RegistryError> {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        for _ in 0..CREATE_ATTEMPTS {
            let code = RoomCode::new(gen_room_code());
            if rooms.contains_key(&code) {
                continue;
            }
            let room: SharedRoom =
                Arc::new(Mutex::new(Room::new(code.clone())));
            rooms.insert(code.clone(), Arc::clone(&room));
            info!(room = %code, total = rooms.len(), "room created");
            return Ok((code, room));
        }
        Err(RegistryError::CodesExhausted(CREATE_ATTEMPTS))
    }

    pub fn get(&self, code: &RoomCode) -> Option<SharedRoom> {
        self.rooms
            .lock()
            .expect("registry lock poisoned")
            .get(code)
            .cloned()
    }

    /// Drops a room from the map. Existing `SharedRoom` handles stay
    /// valid but the code can no longer be joined.
    pub fn remove(&self, code: &RoomCode) -> Option<SharedRoom> {
        let removed = self
            .rooms
            .lock()
            .expect("registry lock poisoned")
            .remove(code);
        if removed.is_some() {
            debug!(room = %code, "room removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every room idle for at least `idle`, returning what was
    /// removed so the caller can notify the evicted connections.
    ///
    /// Eviction and inspection happen under one map lock so a join racing
    /// the sweep either lands before (and refreshes activity) or finds the
    /// room already gone.
    pub fn sweep(&self, idle: Duration) -> Vec<ExpiredRoom> {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        let mut expired = Vec::new();
        rooms.retain(|code, shared| {
            let room = shared.lock().expect("room lock poisoned");
            if room.idle_for() < idle {
                return true;
            }
            expired.push(ExpiredRoom {
                code: code.clone(),
                connections: room.connected(),
            });
            false
        });
        if !expired.is_empty() {
            info!(
                evicted = expired.len(),
                remaining = rooms.len(),
                "idle sweep"
            );
        }
        expired
    }
}

//! The session manager: turns client events into room transitions.
//!
//! One `SessionManager` serves the whole process. It owns:
//!
//! - the [`RoomRegistry`] of live rooms,
//! - the conn → (room, slot) binding table, so a bare disconnect can be
//!   routed without the client naming a room,
//! - the per-room turn-timer tasks,
//! - a handle to the [`Broadcaster`] for the timer and sweep paths, which
//!   deliver on their own instead of returning [`Outbound`] batches.
//!
//! # Concurrency note
//!
//! Transitions are *synchronous*. Each one takes the owning room's lock,
//! mutates, snapshots, and releases — no `.await` ever happens while a
//! room is locked, so a transition can never deadlock with the timer path
//! or stall behind a slow socket. Lock order is registry map → room →
//! (bindings | timers), one side table at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use digitduel_protocol::{ConnectionId, RoomCode, ServerEvent, Slot};
use digitduel_room::{GameError, Room, RoomRegistry, Seat, SharedRoom};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::dispatch::{Broadcaster, Outbound};

/// Where a connection currently sits.
#[derive(Debug, Clone)]
struct Binding {
    room: RoomCode,
    slot: Slot,
}

/// The result of a successful join, beyond the events to deliver.
///
/// The transport needs `room` to subscribe the connection to room
/// broadcasts, `displaced` to unsubscribe a connection that was kicked
/// by a token rejoin, and `left` to unsubscribe the joiner from a room
/// it implicitly walked out of.
#[derive(Debug)]
pub struct JoinOutcome {
    pub room: RoomCode,
    pub slot: Slot,
    pub displaced: Option<ConnectionId>,
    /// The other room this connection held a seat in before the join.
    /// That seat has been released.
    pub left: Option<RoomCode>,
    pub outbound: Vec<Outbound>,
}

pub struct SessionManager {
    registry: Arc<RoomRegistry>,
    config: SessionConfig,
    broadcaster: Arc<dyn Broadcaster>,
    bindings: Mutex<HashMap<ConnectionId, Binding>>,
    /// Pending turn-timer task per room. Arming replaces (and aborts) the
    /// previous entry; the `timer_epoch` on the room is what actually
    /// guarantees a stale fire does nothing.
    timers: Mutex<HashMap<RoomCode, JoinHandle<()>>>,
    /// Self-handle for the timer and sweep tasks, which need an owning
    /// `Arc` to move into their spawned futures.
    weak: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<RoomRegistry>,
        config: SessionConfig,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            registry,
            config,
            broadcaster,
            bindings: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            weak: weak.clone(),
        })
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -- Transitions ------------------------------------------------------

    /// Creates a fresh room. The caller is not seated yet; it joins like
    /// anyone else.
    pub fn create_room(
        &self,
        conn: ConnectionId,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, _room) = self
            .registry
            .create()
            .map_err(|_| GameError::illegal_phase("Could not create room."))?;
        Ok(vec![Outbound::Direct(
            conn,
            ServerEvent::RoomCreated { room_id: code },
        )])
    }

    /// Seats a connection, either fresh (by slot) or by reconnect token.
    ///
    /// A valid token wins over the requested slot: it rebinds its seat to
    /// this connection, displacing whatever connection held it. A token
    /// matching no seat is rejected outright rather than falling back to
    /// a fresh join — a stale credential should fail loudly.
    ///
    /// A connection drives at most one seat: joining while already seated
    /// (same room or another) first releases the old seat, exactly as an
    /// explicit leave would. Nothing is released if the join itself fails.
    pub fn join_room(
        &self,
        conn: ConnectionId,
        room_id: &str,
        slot: Option<u8>,
        token: Option<&str>,
        name: Option<String>,
    ) -> Result<JoinOutcome, GameError> {
        let previous = lock(&self.bindings).get(&conn).cloned();
        let (code, shared) = self.lookup(room_id)?;
        let mut room = lock_room(&shared);

        let (slot, displaced, notice) = if let Some(token) = token {
            let slot =
                room.seat_by_token(token).ok_or(GameError::Unauthorized)?;
            let displaced = room
                .seat(slot)
                .and_then(Seat::connection)
                .filter(|prev| *prev != conn);
            room.rebind(slot, conn);
            (slot, displaced, format!("Player {slot} rejoined."))
        } else {
            let raw = slot.ok_or(GameError::InvalidSlot(0))?;
            let slot = parse_slot(raw)?;
            room.occupy(slot, conn, name)?;
            (slot, None, format!("Player {slot} joined."))
        };

        // Same-room seat change: free the old seat under the same lock so
        // the snapshot below already reflects it.
        let mut moved_from = None;
        if let Some(prev) = &previous {
            if prev.room == code
                && prev.slot != slot
                && room.release(prev.slot, conn).is_ok()
            {
                moved_from = Some(prev.slot);
            }
        }

        let seat = room.seat(slot).ok_or(GameError::Unauthorized)?;
        let joined = ServerEvent::Joined {
            room_id: code.clone(),
            slot,
            token: seat.token().to_string(),
            name: seat.name().map(str::to_string),
        };
        let snapshot = room.snapshot();
        drop(room);

        // Cross-room move: release the old seat after this room's lock is
        // gone (locks are taken one room at a time, never nested).
        let mut left = None;
        let mut left_outbound = Vec::new();
        if let Some(prev) = &previous {
            if prev.room != code {
                left = Some(prev.room.clone());
                if let Some(old_shared) = self.registry.get(&prev.room) {
                    let mut old_room = lock_room(&old_shared);
                    let released = old_room.release(prev.slot, conn).is_ok();
                    let old_snapshot = old_room.snapshot();
                    drop(old_room);
                    if released {
                        debug!(room = %prev.room, slot = %prev.slot, %conn,
                            "seat released by join elsewhere");
                        left_outbound.push(Outbound::Room(
                            prev.room.clone(),
                            system(format!("Player {} left.", prev.slot)),
                        ));
                        left_outbound.push(Outbound::Room(
                            prev.room.clone(),
                            ServerEvent::State(old_snapshot),
                        ));
                    }
                }
            }
        }

        {
            let mut bindings = lock(&self.bindings);
            if let Some(prev) = displaced {
                bindings.remove(&prev);
            }
            bindings.insert(
                conn,
                Binding {
                    room: code.clone(),
                    slot,
                },
            );
        }

        let mut outbound = left_outbound;
        outbound.push(Outbound::Direct(conn, joined));
        if let Some(prev) = displaced {
            debug!(room = %code, %slot, old = %prev, new = %conn,
                "seat rebound, previous connection displaced");
            outbound.push(Outbound::Direct(
                prev,
                ServerEvent::Error {
                    message: "Seat resumed from another connection.".into(),
                },
            ));
        }
        if let Some(old_slot) = moved_from {
            outbound.push(Outbound::Room(
                code.clone(),
                system(format!("Player {old_slot} left.")),
            ));
        }
        outbound.push(Outbound::Room(code.clone(), system(notice)));
        outbound.push(Outbound::Room(code.clone(), ServerEvent::State(snapshot)));

        Ok(JoinOutcome {
            room: code,
            slot,
            displaced,
            left,
            outbound,
        })
    }

    /// Releases a seat's connection binding. The seat itself survives and
    /// can be reclaimed with its token.
    pub fn leave_room(
        &self,
        conn: ConnectionId,
        room_id: &str,
        slot: u8,
    ) -> Result<(RoomCode, Vec<Outbound>), GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let slot = parse_slot(slot)?;
        let mut room = lock_room(&shared);
        room.release(slot, conn)?;
        let snapshot = room.snapshot();
        drop(room);

        lock(&self.bindings).remove(&conn);

        Ok((
            code.clone(),
            vec![
                Outbound::Room(code.clone(), system(format!("Player {slot} left."))),
                Outbound::Room(code, ServerEvent::State(snapshot)),
            ],
        ))
    }

    pub fn set_secret(
        &self,
        conn: ConnectionId,
        room_id: &str,
        slot: u8,
        secret: &str,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let slot = parse_slot(slot)?;
        let mut room = lock_room(&shared);
        room.authorize(slot, conn)?;
        room.set_secret(slot, secret)?;
        let snapshot = room.snapshot();
        drop(room);

        Ok(vec![
            Outbound::Direct(conn, ServerEvent::SecretAck { slot }),
            Outbound::Room(
                code.clone(),
                system(format!("Player {slot} has set their number.")),
            ),
            Outbound::Room(code, ServerEvent::State(snapshot)),
        ])
    }

    pub fn reset_secret(
        &self,
        conn: ConnectionId,
        room_id: &str,
        slot: u8,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let slot = parse_slot(slot)?;
        let mut room = lock_room(&shared);
        room.authorize(slot, conn)?;
        room.reset_secret(slot)?;
        let snapshot = room.snapshot();
        drop(room);

        Ok(vec![
            Outbound::Room(
                code.clone(),
                system(format!("Player {slot} reset their number.")),
            ),
            Outbound::Room(code, ServerEvent::State(snapshot)),
        ])
    }

    /// Starts the game. Any connection in the room may pull the trigger;
    /// readiness is the only gate.
    pub fn start_game(
        &self,
        room_id: &str,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let deadline = self.next_deadline();
        let mut room = lock_room(&shared);
        let epoch = room.start(deadline)?;
        let current_turn = room.current_turn();
        let snapshot = room.snapshot();
        drop(room);

        info!(room = %code, "game started");
        self.arm_turn_timer(&code, &shared, epoch);

        Ok(vec![
            Outbound::Room(
                code.clone(),
                ServerEvent::GameStarted {
                    current_turn,
                    turn_deadline_ms: deadline,
                },
            ),
            Outbound::Room(code, ServerEvent::State(snapshot)),
        ])
    }

    pub fn submit_guess(
        &self,
        conn: ConnectionId,
        room_id: &str,
        slot: u8,
        guess: &str,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let slot = parse_slot(slot)?;
        let deadline = self.next_deadline();
        let mut room = lock_room(&shared);
        room.authorize(slot, conn)?;
        let outcome = room.submit_guess(slot, guess, deadline)?;
        let epoch = room.timer_epoch();
        let snapshot = room.snapshot();
        drop(room);

        let mut outbound = vec![Outbound::Room(
            code.clone(),
            ServerEvent::GuessResult {
                slot,
                guess: guess.to_string(),
                outcome: outcome.outcome,
            },
        )];

        if let Some(winner) = outcome.winner {
            info!(room = %code, %winner, "game over");
            self.cancel_turn_timer(&code);
            outbound.push(Outbound::Room(
                code,
                ServerEvent::GameOver {
                    winner,
                    message: format!("Player {winner} wins!"),
                },
            ));
        } else if let Some(next) = outcome.next_turn {
            self.arm_turn_timer(&code, &shared, epoch);
            outbound.push(Outbound::Room(
                code.clone(),
                ServerEvent::Turn { current_turn: next },
            ));
            outbound.push(Outbound::Room(code, ServerEvent::State(snapshot)));
        }

        Ok(outbound)
    }

    /// Resets the room for a rematch. Permissive at any phase, matching
    /// its role as the "play again" button.
    pub fn new_game(
        &self,
        room_id: &str,
    ) -> Result<Vec<Outbound>, GameError> {
        let (code, shared) = self.lookup(room_id)?;
        let mut room = lock_room(&shared);
        room.reset_for_new_game();
        let snapshot = room.snapshot();
        drop(room);

        self.cancel_turn_timer(&code);

        Ok(vec![
            Outbound::Room(code.clone(), ServerEvent::NewGameStarted),
            Outbound::Room(
                code.clone(),
                system("New game initialized. Set numbers to start."),
            ),
            Outbound::Room(code, ServerEvent::State(snapshot)),
        ])
    }

    /// Routes a socket close. Never an error: an unbound connection just
    /// produces nothing. The seat keeps its token so the player can come
    /// back; the turn clock keeps running.
    pub fn handle_disconnect(
        &self,
        conn: ConnectionId,
    ) -> (Option<RoomCode>, Vec<Outbound>) {
        let Some(binding) = lock(&self.bindings).remove(&conn) else {
            return (None, Vec::new());
        };
        let Some(shared) = self.registry.get(&binding.room) else {
            return (Some(binding.room), Vec::new());
        };

        let mut room = lock_room(&shared);
        let dropped = room.disconnect(conn);
        let snapshot = room.snapshot();
        drop(room);

        if dropped.is_none() {
            // Already displaced by a token rejoin; nothing to announce.
            return (Some(binding.room), Vec::new());
        }
        debug!(room = %binding.room, slot = %binding.slot, %conn, "player disconnected");

        (
            Some(binding.room.clone()),
            vec![
                Outbound::Room(
                    binding.room.clone(),
                    system("A player disconnected."),
                ),
                Outbound::Room(binding.room, ServerEvent::State(snapshot)),
            ],
        )
    }

    // -- Turn timer -------------------------------------------------------

    /// Arms the turn timer for the turn identified by `epoch`. Replaces
    /// any previous timer for the room. No-op when timeouts are disabled.
    fn arm_turn_timer(&self, code: &RoomCode, shared: &SharedRoom, epoch: u64) {
        if self.config.turn_timeout.is_zero() {
            return;
        }
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        let code_owned = code.clone();
        let room = Arc::clone(shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(manager.config.turn_timeout).await;
            manager.fire_turn_timeout(&code_owned, &room, epoch);
        });
        if let Some(previous) = lock(&self.timers).insert(code.clone(), task) {
            previous.abort();
        }
    }

    fn cancel_turn_timer(&self, code: &RoomCode) {
        if let Some(task) = lock(&self.timers).remove(code) {
            task.abort();
        }
    }

    /// The timer body. Runs after the full timeout slept; by then the
    /// turn may long be over, so everything hinges on the epoch check
    /// under the room lock.
    fn fire_turn_timeout(&self, code: &RoomCode, shared: &SharedRoom, epoch: u64) {
        // Drop our own map entry before rearming; the epoch check below
        // covers the window where a newer timer already replaced it.
        lock(&self.timers).remove(code);

        let deadline = self.next_deadline();
        let mut room = lock_room(shared);
        if room.timer_epoch() != epoch {
            return;
        }
        let Ok((next_turn, next_epoch)) = room.forfeit_turn(deadline) else {
            return;
        };
        let timed_out = next_turn.opponent();
        let snapshot = room.snapshot();
        drop(room);

        info!(room = %code, slot = %timed_out, "turn timed out");
        self.broadcaster
            .broadcast(code, system(format!("Player {timed_out} timed out.")));
        self.broadcaster.broadcast(
            code,
            ServerEvent::Turn {
                current_turn: next_turn,
            },
        );
        self.broadcaster
            .broadcast(code, ServerEvent::State(snapshot));

        self.arm_turn_timer(code, shared, next_epoch);
    }

    // -- Idle sweep -------------------------------------------------------

    /// Runs the idle sweep periodically until aborted. One per process.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let manager = self.weak.upgrade().expect("manager alive");
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(manager.config.sweep_interval);
            ticker.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            loop {
                ticker.tick().await;
                manager.sweep_idle_rooms();
            }
        })
    }

    /// One sweep pass: evicts idle rooms, tells their surviving
    /// connections, and clears every piece of state pointing at them.
    pub fn sweep_idle_rooms(&self) {
        let expired = self.registry.sweep(self.config.idle_timeout);
        if expired.is_empty() {
            return;
        }
        let mut bindings = lock(&self.bindings);
        for room in expired {
            self.cancel_turn_timer(&room.code);
            for conn in room.connections {
                bindings.remove(&conn);
                self.broadcaster.send(
                    conn,
                    ServerEvent::RoomExpired {
                        message: "Room closed due to inactivity.".into(),
                    },
                );
            }
            self.broadcaster.forget_room(&room.code);
        }
    }

    // -- Internals --------------------------------------------------------

    fn lookup(
        &self,
        room_id: &str,
    ) -> Result<(RoomCode, SharedRoom), GameError> {
        let code = RoomCode::new(room_id);
        if code.is_empty() {
            return Err(GameError::NotFound);
        }
        let room = self.registry.get(&code).ok_or(GameError::NotFound)?;
        Ok((code, room))
    }

    /// Wall-clock deadline for the turn about to start, or `None` when
    /// turn timers are disabled. Wall clock because clients render it.
    fn next_deadline(&self) -> Option<u64> {
        if self.config.turn_timeout.is_zero() {
            None
        } else {
            Some(now_ms() + self.config.turn_timeout.as_millis() as u64)
        }
    }
}

fn system(message: impl Into<String>) -> ServerEvent {
    ServerEvent::System {
        message: message.into(),
    }
}

fn parse_slot(raw: u8) -> Result<Slot, GameError> {
    Slot::try_from(raw).map_err(|_| GameError::InvalidSlot(raw))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("session lock poisoned")
}

fn lock_room(shared: &SharedRoom) -> std::sync::MutexGuard<'_, Room> {
    shared.lock().expect("room lock poisoned")
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // -- Test doubles and helpers -----------------------------------------

    /// Records everything the timer/sweep paths deliver.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<Recorded>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Sent(ConnectionId, ServerEvent),
        Broadcast(RoomCode, ServerEvent),
        Forgot(RoomCode),
    }

    impl Recorder {
        fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }
    }

    impl Broadcaster for Recorder {
        fn send(&self, conn: ConnectionId, event: ServerEvent) {
            self.log.lock().unwrap().push(Recorded::Sent(conn, event));
        }
        fn broadcast(&self, room: &RoomCode, event: ServerEvent) {
            self.log
                .lock()
                .unwrap()
                .push(Recorded::Broadcast(room.clone(), event));
        }
        fn forget_room(&self, room: &RoomCode) {
            self.log.lock().unwrap().push(Recorded::Forgot(room.clone()));
        }
    }

    /// Turn timers off so transitions never spawn tasks — these tests run
    /// without a runtime.
    fn test_config() -> SessionConfig {
        SessionConfig {
            turn_timeout: Duration::ZERO,
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }

    fn manager() -> (Arc<SessionManager>, Arc<Recorder>) {
        manager_with(test_config())
    }

    fn manager_with(
        config: SessionConfig,
    ) -> (Arc<SessionManager>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let manager = SessionManager::new(
            Arc::new(RoomRegistry::new()),
            config,
            recorder.clone(),
        );
        (manager, recorder)
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn create(manager: &Arc<SessionManager>) -> RoomCode {
        let out = manager.create_room(conn(0)).unwrap();
        match &out[0] {
            Outbound::Direct(_, ServerEvent::RoomCreated { room_id }) => {
                room_id.clone()
            }
            other => panic!("expected room_created, got {other:?}"),
        }
    }

    fn join(
        manager: &Arc<SessionManager>,
        code: &RoomCode,
        c: ConnectionId,
        slot: u8,
    ) -> String {
        let outcome = manager
            .join_room(c, code.as_str(), Some(slot), None, None)
            .unwrap();
        outcome
            .outbound
            .iter()
            .find_map(|out| match out {
                Outbound::Direct(_, ServerEvent::Joined { token, .. }) => {
                    Some(token.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| {
                panic!("expected joined, got {:?}", outcome.outbound)
            })
    }

    /// Create + both joins + both secrets ("1111"/"2222") + start.
    fn started_game(
        manager: &Arc<SessionManager>,
    ) -> (RoomCode, String, String) {
        let code = create(manager);
        let t1 = join(manager, &code, conn(1), 1);
        let t2 = join(manager, &code, conn(2), 2);
        manager.set_secret(conn(1), code.as_str(), 1, "1111").unwrap();
        manager.set_secret(conn(2), code.as_str(), 2, "2222").unwrap();
        manager.start_game(code.as_str()).unwrap();
        (code, t1, t2)
    }

    fn room_events(out: &[Outbound]) -> Vec<&ServerEvent> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Room(_, ev) => Some(ev),
                Outbound::Direct(..) => None,
            })
            .collect()
    }

    // =====================================================================
    // create / join
    // =====================================================================

    #[test]
    fn test_create_room_replies_to_caller_only() {
        let (manager, _) = manager();
        let out = manager.create_room(conn(5)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            Outbound::Direct(c, ServerEvent::RoomCreated { .. }) if c == conn(5)
        ));
        assert_eq!(manager.registry().len(), 1);
    }

    #[test]
    fn test_join_unknown_room_is_not_found() {
        let (manager, _) = manager();
        let err = manager
            .join_room(conn(1), "NOSUCH", Some(1), None, None)
            .unwrap_err();
        assert_eq!(err, GameError::NotFound);
    }

    #[test]
    fn test_join_room_code_is_case_insensitive() {
        let (manager, _) = manager();
        let code = create(&manager);
        let lowered = code.as_str().to_lowercase();
        let outcome = manager
            .join_room(conn(1), &lowered, Some(1), None, None)
            .unwrap();
        assert_eq!(outcome.room, code);
    }

    #[test]
    fn test_join_sends_token_privately_and_state_to_room() {
        let (manager, _) = manager();
        let code = create(&manager);
        let outcome = manager
            .join_room(conn(1), code.as_str(), Some(1), None, Some("ada".into()))
            .unwrap();

        assert_eq!(outcome.slot, Slot::One);
        assert!(outcome.displaced.is_none());
        // Joined (with the token) goes to the caller alone.
        assert!(matches!(
            &outcome.outbound[0],
            Outbound::Direct(c, ServerEvent::Joined { name, .. })
                if *c == conn(1) && name.as_deref() == Some("ada")
        ));
        let room_evs = room_events(&outcome.outbound);
        assert!(matches!(
            room_evs[0],
            ServerEvent::System { message } if message == "Player 1 joined."
        ));
        assert!(matches!(room_evs[1], ServerEvent::State(_)));
    }

    #[test]
    fn test_join_missing_slot_is_invalid() {
        let (manager, _) = manager();
        let code = create(&manager);
        let err = manager
            .join_room(conn(1), code.as_str(), None, None, None)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidSlot(_)));
    }

    #[test]
    fn test_join_slot_three_is_invalid() {
        let (manager, _) = manager();
        let code = create(&manager);
        let err = manager
            .join_room(conn(1), code.as_str(), Some(3), None, None)
            .unwrap_err();
        assert_eq!(err, GameError::InvalidSlot(3));
    }

    #[test]
    fn test_join_occupied_seat_is_conflict() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        let err = manager
            .join_room(conn(2), code.as_str(), Some(1), None, None)
            .unwrap_err();
        assert_eq!(err, GameError::SlotConflict(Slot::One));
    }

    #[test]
    fn test_join_second_room_releases_first_seat() {
        let (manager, _) = manager();
        let first = create(&manager);
        let second = create(&manager);
        join(&manager, &first, conn(1), 1);

        let outcome = manager
            .join_room(conn(1), second.as_str(), Some(1), None, None)
            .unwrap();
        assert_eq!(outcome.left.as_ref(), Some(&first));
        // The walked-out room hears about it before the new join's batch.
        assert!(matches!(
            &outcome.outbound[0],
            Outbound::Room(code, ServerEvent::System { message })
                if *code == first && message == "Player 1 left."
        ));
        assert!(matches!(
            &outcome.outbound[1],
            Outbound::Room(code, ServerEvent::State(_)) if *code == first
        ));

        // The vacated seat is genuinely free for someone else.
        join(&manager, &first, conn(2), 1);
    }

    #[test]
    fn test_join_other_slot_in_same_room_moves_the_seat() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);

        let outcome = manager
            .join_room(conn(1), code.as_str(), Some(2), None, None)
            .unwrap();
        assert_eq!(outcome.slot, Slot::Two);
        assert!(outcome.left.is_none());

        // Slot 1 opened up when its holder slid over to slot 2.
        join(&manager, &code, conn(2), 1);
    }

    #[test]
    fn test_disconnect_after_switching_rooms_leaves_no_orphan_seat() {
        let (manager, _) = manager();
        let first = create(&manager);
        let second = create(&manager);
        join(&manager, &first, conn(1), 1);
        join(&manager, &second, conn(1), 1);
        manager.handle_disconnect(conn(1));

        // Neither room may still show conn(1) holding a live seat.
        join(&manager, &first, conn(2), 1);
        join(&manager, &second, conn(3), 1);
    }

    // =====================================================================
    // Reconnection
    // =====================================================================

    #[test]
    fn test_token_rejoin_after_disconnect_keeps_seat_state() {
        let (manager, _) = manager();
        let code = create(&manager);
        let token = join(&manager, &code, conn(1), 1);
        manager.set_secret(conn(1), code.as_str(), 1, "1234").unwrap();
        manager.handle_disconnect(conn(1));

        let outcome = manager
            .join_room(conn(9), code.as_str(), None, Some(&token), None)
            .unwrap();
        assert_eq!(outcome.slot, Slot::One);
        assert!(outcome.displaced.is_none());
        // Same token comes back; the readiness flag survived the drop.
        assert!(matches!(
            &outcome.outbound[0],
            Outbound::Direct(_, ServerEvent::Joined { token: t, .. }) if *t == token
        ));
        let room_evs = room_events(&outcome.outbound);
        assert!(matches!(
            room_evs[0],
            ServerEvent::System { message } if message == "Player 1 rejoined."
        ));
        match room_evs[1] {
            ServerEvent::State(snap) => assert!(snap.readiness.slot1_set),
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn test_token_rejoin_displaces_live_connection() {
        let (manager, _) = manager();
        let code = create(&manager);
        let token = join(&manager, &code, conn(1), 1);

        let outcome = manager
            .join_room(conn(2), code.as_str(), None, Some(&token), None)
            .unwrap();
        assert_eq!(outcome.displaced, Some(conn(1)));
        assert!(outcome.outbound.iter().any(|o| matches!(
            o,
            Outbound::Direct(c, ServerEvent::Error { .. }) if *c == conn(1)
        )));
        // The displaced connection no longer drives the seat.
        let err = manager
            .set_secret(conn(1), code.as_str(), 1, "1234")
            .unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
        manager.set_secret(conn(2), code.as_str(), 1, "1234").unwrap();
    }

    #[test]
    fn test_unknown_token_is_rejected_not_fresh_joined() {
        let (manager, _) = manager();
        let code = create(&manager);
        let err = manager
            .join_room(conn(1), code.as_str(), Some(1), Some("bogus"), None)
            .unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
    }

    #[test]
    fn test_fresh_join_onto_disconnected_seat_rotates_token() {
        let (manager, _) = manager();
        let code = create(&manager);
        let old_token = join(&manager, &code, conn(1), 1);
        manager.handle_disconnect(conn(1));

        let new_token = join(&manager, &code, conn(2), 1);
        assert_ne!(new_token, old_token);
        let err = manager
            .join_room(conn(3), code.as_str(), None, Some(&old_token), None)
            .unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
    }

    // =====================================================================
    // Secrets and start
    // =====================================================================

    #[test]
    fn test_set_secret_acks_caller_and_broadcasts() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        let out = manager
            .set_secret(conn(1), code.as_str(), 1, "1234")
            .unwrap();
        assert!(matches!(
            out[0],
            Outbound::Direct(c, ServerEvent::SecretAck { slot: Slot::One })
                if c == conn(1)
        ));
        let room_evs = room_events(&out);
        assert!(matches!(
            room_evs[0],
            ServerEvent::System { message }
                if message == "Player 1 has set their number."
        ));
    }

    #[test]
    fn test_set_secret_for_foreign_slot_is_unauthorized() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        join(&manager, &code, conn(2), 2);
        let err = manager
            .set_secret(conn(1), code.as_str(), 2, "1234")
            .unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
    }

    #[test]
    fn test_start_game_before_both_secrets_fails() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        manager.set_secret(conn(1), code.as_str(), 1, "1234").unwrap();
        let err = manager.start_game(code.as_str()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Both players must set their numbers."
        );
    }

    #[test]
    fn test_start_game_broadcasts_first_turn() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        join(&manager, &code, conn(2), 2);
        manager.set_secret(conn(1), code.as_str(), 1, "1111").unwrap();
        manager.set_secret(conn(2), code.as_str(), 2, "2222").unwrap();

        let out = manager.start_game(code.as_str()).unwrap();
        let room_evs = room_events(&out);
        assert!(matches!(
            room_evs[0],
            ServerEvent::GameStarted {
                current_turn: Slot::One,
                // Timers are disabled in this config.
                turn_deadline_ms: None,
            }
        ));
        assert!(matches!(room_evs[1], ServerEvent::State(_)));
    }

    // =====================================================================
    // Guessing
    // =====================================================================

    #[test]
    fn test_submit_guess_partial_broadcasts_result_turn_state() {
        let (manager, _) = manager();
        let (code, ..) = started_game(&manager);
        let out = manager
            .submit_guess(conn(1), code.as_str(), 1, "2111")
            .unwrap();
        let room_evs = room_events(&out);
        assert!(matches!(
            room_evs[0],
            ServerEvent::GuessResult { slot: Slot::One, outcome, .. }
                if outcome == "1 correct"
        ));
        assert!(matches!(
            room_evs[1],
            ServerEvent::Turn {
                current_turn: Slot::Two
            }
        ));
        assert!(matches!(room_evs[2], ServerEvent::State(_)));
    }

    #[test]
    fn test_submit_guess_out_of_turn_is_rejected() {
        let (manager, _) = manager();
        let (code, ..) = started_game(&manager);
        let err = manager
            .submit_guess(conn(2), code.as_str(), 2, "1111")
            .unwrap_err();
        assert_eq!(err, GameError::NotYourTurn(Slot::One));
    }

    #[test]
    fn test_submit_guess_with_wrong_connection_is_unauthorized() {
        let (manager, _) = manager();
        let (code, ..) = started_game(&manager);
        let err = manager
            .submit_guess(conn(2), code.as_str(), 1, "2222")
            .unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
    }

    #[test]
    fn test_winning_guess_broadcasts_game_over() {
        let (manager, _) = manager();
        let (code, ..) = started_game(&manager);
        let out = manager
            .submit_guess(conn(1), code.as_str(), 1, "2222")
            .unwrap();
        let room_evs = room_events(&out);
        assert!(matches!(
            room_evs[0],
            ServerEvent::GuessResult { outcome, .. }
                if outcome == "Correct! You win!"
        ));
        assert!(matches!(
            room_evs[1],
            ServerEvent::GameOver { winner: Slot::One, message }
                if message == "Player 1 wins!"
        ));
        // Game over closes the room to further guesses.
        let err = manager
            .submit_guess(conn(2), code.as_str(), 2, "1111")
            .unwrap_err();
        assert!(matches!(err, GameError::IllegalPhase(_)));
    }

    // =====================================================================
    // new_game / leave / disconnect
    // =====================================================================

    #[test]
    fn test_new_game_resets_and_announces() {
        let (manager, _) = manager();
        let (code, ..) = started_game(&manager);
        manager.submit_guess(conn(1), code.as_str(), 1, "2222").unwrap();

        let out = manager.new_game(code.as_str()).unwrap();
        let room_evs = room_events(&out);
        assert!(matches!(room_evs[0], ServerEvent::NewGameStarted));
        assert!(matches!(
            room_evs[1],
            ServerEvent::System { message }
                if message == "New game initialized. Set numbers to start."
        ));
        match room_evs[2] {
            ServerEvent::State(snap) => {
                assert!(!snap.started);
                assert!(!snap.readiness.slot1_set);
                assert!(snap.history.one.is_empty());
            }
            other => panic!("expected state, got {other:?}"),
        }
        // Seats survived: both connections can set again right away.
        manager.set_secret(conn(1), code.as_str(), 1, "3333").unwrap();
        manager.set_secret(conn(2), code.as_str(), 2, "4444").unwrap();
    }

    #[test]
    fn test_leave_room_frees_seat_binding_but_keeps_seat() {
        let (manager, _) = manager();
        let code = create(&manager);
        let token = join(&manager, &code, conn(1), 1);

        let (left_room, out) =
            manager.leave_room(conn(1), code.as_str(), 1).unwrap();
        assert_eq!(left_room, code);
        assert!(matches!(
            room_events(&out)[0],
            ServerEvent::System { message } if message == "Player 1 left."
        ));
        // The token still reclaims the seat.
        let outcome = manager
            .join_room(conn(5), code.as_str(), None, Some(&token), None)
            .unwrap();
        assert_eq!(outcome.slot, Slot::One);
    }

    #[test]
    fn test_leave_room_for_foreign_seat_is_unauthorized() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);
        let err = manager.leave_room(conn(9), code.as_str(), 1).unwrap_err();
        assert_eq!(err, GameError::Unauthorized);
    }

    #[test]
    fn test_disconnect_of_unbound_connection_is_silent() {
        let (manager, _) = manager();
        let (room, out) = manager.handle_disconnect(conn(42));
        assert!(room.is_none());
        assert!(out.is_empty());
    }

    #[test]
    fn test_disconnect_announces_anonymously() {
        let (manager, _) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);

        let (room, out) = manager.handle_disconnect(conn(1));
        assert_eq!(room, Some(code));
        assert!(matches!(
            room_events(&out)[0],
            ServerEvent::System { message }
                if message == "A player disconnected."
        ));
    }

    // =====================================================================
    // Idle sweep
    // =====================================================================

    #[test]
    fn test_sweep_expires_idle_room_and_notifies_bound_connections() {
        let config = SessionConfig {
            turn_timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO, // everything is idle
            sweep_interval: Duration::from_secs(60),
        };
        let (manager, recorder) = manager_with(config);
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);

        manager.sweep_idle_rooms();

        assert!(manager.registry().is_empty());
        let log = recorder.take();
        assert!(log.contains(&Recorded::Sent(
            conn(1),
            ServerEvent::RoomExpired {
                message: "Room closed due to inactivity.".into()
            }
        )));
        assert!(log.contains(&Recorded::Forgot(code.clone())));
        // The binding is gone too: a later disconnect routes nowhere.
        let (room, out) = manager.handle_disconnect(conn(1));
        assert!(room.is_none());
        assert!(out.is_empty());
    }

    #[test]
    fn test_sweep_leaves_active_rooms_alone() {
        let (manager, recorder) = manager();
        let code = create(&manager);
        join(&manager, &code, conn(1), 1);

        manager.sweep_idle_rooms();

        assert_eq!(manager.registry().len(), 1);
        assert!(recorder.take().is_empty());
    }
}

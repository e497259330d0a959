//! The authoritative per-game data structure.
//!
//! A [`Room`] holds two [`Seat`]s, their secrets and guess histories, and
//! the turn state. All methods are synchronous and side-effect free beyond
//! the room itself: they validate preconditions, then either apply the
//! change atomically or return a [`GameError`] leaving the room untouched.
//! The session layer serializes calls through one lock per room.

use std::time::{Duration, Instant};

use digitduel_protocol::{
    ConnectionId, GuessEntry, PerSlot, Readiness, RoomCode, Slot,
    StateSnapshot,
};

use crate::config::DIGIT_COUNT;
use crate::error::GameError;
use crate::logic::{exact_matches, gen_token, validate_number};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The coarse game stage of a room.
///
/// ```text
/// WaitingForSecrets ⇄ Ready → InProgress → Finished
///         ↑                                    │
///         └────────────(new_game)──────────────┘
/// ```
///
/// The phase is *derived* from room state (`winner`, `started`, secrets),
/// never stored, so it can't drift out of sync with the fields it
/// summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// At least one seat has no secret yet.
    WaitingForSecrets,
    /// Both secrets set, game not yet explicitly started.
    Ready,
    /// Guessing in progress; `current_turn` is meaningful.
    InProgress,
    /// A winning guess landed; only `new_game` leaves this phase.
    Finished,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::WaitingForSecrets => "WaitingForSecrets",
            Phase::Ready => "Ready",
            Phase::InProgress => "InProgress",
            Phase::Finished => "Finished",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// One player position and everything that belongs to it.
///
/// A seat outlives the connections that drive it: disconnecting clears the
/// binding but the token, secret, and history stay, so a reconnect resumes
/// exactly where the player left off.
#[derive(Debug, Clone)]
pub struct Seat {
    connection: Option<ConnectionId>,
    token: String,
    name: Option<String>,
    secret: Option<String>,
    history: Vec<GuessEntry>,
    finished: bool,
}

impl Seat {
    fn new(connection: ConnectionId, name: Option<String>) -> Seat {
        Seat {
            connection: Some(connection),
            token: gen_token(),
            name,
            secret: None,
            history: Vec::new(),
            finished: false,
        }
    }

    /// The connection currently driving this seat, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The seat's reconnect credential. Sent only to its own connection.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn history(&self) -> &[GuessEntry] {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// ---------------------------------------------------------------------------
// GuessOutcome
// ---------------------------------------------------------------------------

/// The result of one processed guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessOutcome {
    /// Positional digit matches, 0..=4.
    pub matches: usize,
    /// Client-facing description ("2 correct" / "Correct! You win!").
    pub outcome: String,
    /// Set when this guess ended the game.
    pub winner: Option<Slot>,
    /// The seat on turn after this guess; `None` when the game ended.
    pub next_turn: Option<Slot>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game instance, identified by its public code.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    seats: [Option<Seat>; 2],
    started: bool,
    current_turn: Slot,
    turn_deadline_ms: Option<u64>,
    /// Bumped on every turn change or cancellation. An armed timer
    /// remembers the epoch it was armed for and becomes a no-op if the
    /// room has moved on — this is what makes the timer-vs-guess race
    /// safe without extra synchronization.
    timer_epoch: u64,
    winner: Option<Slot>,
    last_activity: Instant,
}

impl Room {
    pub fn new(code: RoomCode) -> Room {
        Room {
            code,
            seats: [None, None],
            started: false,
            current_turn: Slot::One,
            turn_deadline_ms: None,
            timer_epoch: 0,
            winner: None,
            last_activity: Instant::now(),
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        if self.winner.is_some() {
            Phase::Finished
        } else if self.started {
            Phase::InProgress
        } else if self.both_secrets_set() {
            Phase::Ready
        } else {
            Phase::WaitingForSecrets
        }
    }

    pub fn current_turn(&self) -> Slot {
        self.current_turn
    }

    pub fn winner(&self) -> Option<Slot> {
        self.winner
    }

    pub fn turn_deadline_ms(&self) -> Option<u64> {
        self.turn_deadline_ms
    }

    pub fn timer_epoch(&self) -> u64 {
        self.timer_epoch
    }

    pub fn seat(&self, slot: Slot) -> Option<&Seat> {
        self.seats[slot.index()].as_ref()
    }

    pub fn both_secrets_set(&self) -> bool {
        Slot::ALL
            .iter()
            .all(|s| self.seat(*s).is_some_and(Seat::has_secret))
    }

    /// How long since the last state-changing event.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Connections currently bound to either seat.
    pub fn connected(&self) -> Vec<ConnectionId> {
        self.seats
            .iter()
            .flatten()
            .filter_map(Seat::connection)
            .collect()
    }

    pub fn has_connected_player(&self) -> bool {
        self.seats.iter().flatten().any(Seat::is_connected)
    }

    /// Marks the room as active now. Called by every applied transition.
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn bump_epoch(&mut self) -> u64 {
        self.timer_epoch += 1;
        self.timer_epoch
    }

    // -- Seat occupancy ---------------------------------------------------

    /// Verifies that `conn` currently drives `slot`.
    ///
    /// Every slot-scoped action (set/reset secret, guess, leave) goes
    /// through this; a connection that was kicked by a token rejoin fails
    /// here from then on.
    pub fn authorize(
        &self,
        slot: Slot,
        conn: ConnectionId,
    ) -> Result<(), GameError> {
        match self.seat(slot) {
            Some(seat) if seat.connection() == Some(conn) => Ok(()),
            _ => Err(GameError::Unauthorized),
        }
    }

    /// Finds the seat a reconnect token belongs to.
    pub fn seat_by_token(&self, token: &str) -> Option<Slot> {
        Slot::ALL.into_iter().find(|s| {
            self.seat(*s).is_some_and(|seat| seat.token() == token)
        })
    }

    /// Occupies a seat with a fresh identity, minting a new token.
    ///
    /// A vacant seat is simply taken. A seat whose occupant is
    /// *disconnected* is taken over: the seat keeps its secret and history
    /// but gets a new token (the old credential dies with the old
    /// identity). A seat driven by a live connection is a conflict.
    pub fn occupy(
        &mut self,
        slot: Slot,
        conn: ConnectionId,
        name: Option<String>,
    ) -> Result<&Seat, GameError> {
        match &mut self.seats[slot.index()] {
            Some(seat) if seat.is_connected() => {
                return Err(GameError::SlotConflict(slot));
            }
            Some(seat) => {
                seat.connection = Some(conn);
                seat.token = gen_token();
                if name.is_some() {
                    seat.name = name;
                }
            }
            vacant @ None => {
                *vacant = Some(Seat::new(conn, name));
            }
        }
        self.touch();
        Ok(self.seats[slot.index()].as_ref().expect("seat just filled"))
    }

    /// Rebinds a seat to a new connection after a valid token was
    /// presented. Any previous connection on the seat is displaced; the
    /// token and game state are untouched.
    pub fn rebind(&mut self, slot: Slot, conn: ConnectionId) -> &Seat {
        let seat = self.seats[slot.index()]
            .as_mut()
            .expect("rebind only follows a token match");
        seat.connection = Some(conn);
        self.touch();
        self.seats[slot.index()].as_ref().expect("seat exists")
    }

    /// Clears the seat's connection binding on explicit leave.
    /// The seat identity (token, secret, history) survives.
    pub fn release(
        &mut self,
        slot: Slot,
        conn: ConnectionId,
    ) -> Result<(), GameError> {
        self.authorize(slot, conn)?;
        if let Some(seat) = &mut self.seats[slot.index()] {
            seat.connection = None;
        }
        self.touch();
        Ok(())
    }

    /// Clears whichever seat `conn` was driving, if any. Used on socket
    /// close, where no slot is claimed and nothing is an error.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<Slot> {
        for slot in Slot::ALL {
            if let Some(seat) = &mut self.seats[slot.index()] {
                if seat.connection == Some(conn) {
                    seat.connection = None;
                    self.touch();
                    return Some(slot);
                }
            }
        }
        None
    }

    // -- Secret handling --------------------------------------------------

    /// Stores a seat's secret. Legal only before the game starts, and only
    /// once — a set secret is immutable until explicitly reset.
    pub fn set_secret(
        &mut self,
        slot: Slot,
        secret: &str,
    ) -> Result<(), GameError> {
        self.require_pregame("set")?;
        if !validate_number(secret) {
            return Err(GameError::Validation { what: "Secret" });
        }
        let seat = self.seats[slot.index()]
            .as_mut()
            .ok_or(GameError::Unauthorized)?;
        if seat.secret.is_some() {
            return Err(GameError::illegal_phase(
                "Secret already set. Reset it first.",
            ));
        }
        seat.secret = Some(secret.to_string());
        self.touch();
        Ok(())
    }

    /// Clears a previously set secret, dropping the phase back to
    /// `WaitingForSecrets` if it had reached `Ready`.
    pub fn reset_secret(&mut self, slot: Slot) -> Result<(), GameError> {
        self.require_pregame("reset")?;
        let seat = self.seats[slot.index()]
            .as_mut()
            .ok_or(GameError::Unauthorized)?;
        seat.secret = None;
        self.touch();
        Ok(())
    }

    fn require_pregame(&self, verb: &str) -> Result<(), GameError> {
        match self.phase() {
            Phase::WaitingForSecrets | Phase::Ready => Ok(()),
            Phase::InProgress => Err(GameError::illegal_phase(format!(
                "Cannot {verb} secret after game has started."
            ))),
            Phase::Finished => Err(GameError::illegal_phase(
                "Game is over. Start a new game first.",
            )),
        }
    }

    // -- Game flow --------------------------------------------------------

    /// Starts the game. Slot 1 always moves first.
    ///
    /// Returns the new timer epoch so the caller can arm the turn timer
    /// for exactly this turn.
    pub fn start(
        &mut self,
        deadline_ms: Option<u64>,
    ) -> Result<u64, GameError> {
        match self.phase() {
            Phase::Ready => {}
            Phase::WaitingForSecrets => {
                return Err(GameError::illegal_phase(
                    "Both players must set their numbers.",
                ));
            }
            Phase::InProgress => {
                return Err(GameError::illegal_phase("Game already started."));
            }
            Phase::Finished => {
                return Err(GameError::illegal_phase(
                    "Game is over. Start a new game first.",
                ));
            }
        }
        self.started = true;
        self.current_turn = Slot::One;
        self.turn_deadline_ms = deadline_ms;
        for seat in self.seats.iter_mut().flatten() {
            seat.finished = false;
        }
        self.touch();
        Ok(self.bump_epoch())
    }

    /// Processes a guess from the seat on turn.
    ///
    /// On a full match the room becomes terminal: `winner` is set, the
    /// guesser's seat is marked finished, and the deadline is cleared. On
    /// a partial match the turn flips and `next_deadline_ms` becomes the
    /// new deadline. Either way the timer epoch advances, invalidating any
    /// timer armed for the old turn.
    pub fn submit_guess(
        &mut self,
        slot: Slot,
        guess: &str,
        next_deadline_ms: Option<u64>,
    ) -> Result<GuessOutcome, GameError> {
        match self.phase() {
            Phase::InProgress => {}
            Phase::Finished => {
                return Err(GameError::illegal_phase(
                    "Game is over. Start a new game first.",
                ));
            }
            _ => {
                return Err(GameError::illegal_phase("Game has not started."));
            }
        }
        if slot != self.current_turn {
            return Err(GameError::NotYourTurn(self.current_turn));
        }
        if self.seat(slot).is_some_and(Seat::is_finished) {
            return Err(GameError::illegal_phase(
                "You have already finished.",
            ));
        }
        if !validate_number(guess) {
            return Err(GameError::Validation { what: "Guess" });
        }

        // InProgress implies both secrets are set; a missing one here is a
        // broken invariant, not a client error.
        let secret = self
            .seat(slot.opponent())
            .and_then(|s| s.secret.clone())
            .expect("opponent secret set while in progress");

        let matches = exact_matches(&secret, guess);
        let won = matches == DIGIT_COUNT;
        let outcome = if won {
            "Correct! You win!".to_string()
        } else {
            format!("{matches} correct")
        };

        let seat = self.seats[slot.index()]
            .as_mut()
            .expect("acting seat exists while in progress");
        seat.history.push(GuessEntry {
            guess: guess.to_string(),
            outcome: outcome.clone(),
        });

        let (winner, next_turn) = if won {
            seat.finished = true;
            self.winner = Some(slot);
            self.started = false;
            self.turn_deadline_ms = None;
            (Some(slot), None)
        } else {
            self.current_turn = slot.opponent();
            self.turn_deadline_ms = next_deadline_ms;
            (None, Some(self.current_turn))
        };
        self.bump_epoch();
        self.touch();

        Ok(GuessOutcome {
            matches,
            outcome,
            winner,
            next_turn,
        })
    }

    /// Forfeits the current turn after a timeout: no history entry, turn
    /// flips, deadline refreshes. Returns the seat now on turn.
    ///
    /// Deliberately does NOT count as activity: forfeits are
    /// server-generated, and a room whose only events are its own
    /// timeouts must still go idle and get swept.
    pub fn forfeit_turn(
        &mut self,
        next_deadline_ms: Option<u64>,
    ) -> Result<(Slot, u64), GameError> {
        if self.phase() != Phase::InProgress {
            return Err(GameError::illegal_phase("Game has not started."));
        }
        self.current_turn = self.current_turn.opponent();
        self.turn_deadline_ms = next_deadline_ms;
        let epoch = self.bump_epoch();
        Ok((self.current_turn, epoch))
    }

    /// Resets the room for a rematch: secrets, histories, finished flags,
    /// winner and turn state are cleared; seats, tokens, and the room code
    /// are preserved.
    pub fn reset_for_new_game(&mut self) {
        for seat in self.seats.iter_mut().flatten() {
            seat.secret = None;
            seat.history.clear();
            seat.finished = false;
        }
        self.started = false;
        self.winner = None;
        self.current_turn = Slot::One;
        self.turn_deadline_ms = None;
        self.bump_epoch();
        self.touch();
    }

    // -- Public view ------------------------------------------------------

    /// The broadcast-safe view of the room. Never includes secrets or
    /// tokens.
    pub fn snapshot(&self) -> StateSnapshot {
        let seat_flag = |slot: Slot, f: fn(&Seat) -> bool| {
            self.seat(slot).is_some_and(f)
        };
        StateSnapshot {
            started: self.started,
            current_turn: self.current_turn,
            finished: PerSlot {
                one: seat_flag(Slot::One, Seat::is_finished),
                two: seat_flag(Slot::Two, Seat::is_finished),
            },
            history: PerSlot {
                one: self
                    .seat(Slot::One)
                    .map(|s| s.history.clone())
                    .unwrap_or_default(),
                two: self
                    .seat(Slot::Two)
                    .map(|s| s.history.clone())
                    .unwrap_or_default(),
            },
            readiness: Readiness {
                slot1_set: seat_flag(Slot::One, Seat::has_secret),
                slot2_set: seat_flag(Slot::Two, Seat::has_secret),
            },
            turn_deadline_ms: self.turn_deadline_ms,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

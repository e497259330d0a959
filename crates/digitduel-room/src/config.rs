//! Game constants.
//!
//! These are fixed properties of the game, not deployment tunables — the
//! deployment-facing knobs (turn timeout, idle expiry) live in the session
//! layer's `SessionConfig`.

/// Number of digits in a secret or a guess.
pub const DIGIT_COUNT: usize = 4;

/// Minimum valid secret number (inclusive). Excludes leading zeros.
pub const MIN_SECRET: u32 = 1000;

/// Maximum valid secret number (inclusive).
pub const MAX_SECRET: u32 = 9999;

/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Length of generated reconnect tokens.
pub const TOKEN_LENGTH: usize = 32;

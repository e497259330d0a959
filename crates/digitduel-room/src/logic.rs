//! Pure game rules and generators: digit matching, input validation,
//! room codes, reconnect tokens.

use rand::Rng;

use crate::config::{
    DIGIT_COUNT, MAX_SECRET, MIN_SECRET, ROOM_CODE_LENGTH, TOKEN_LENGTH,
};

/// Counts the positions where `guess` and `secret` hold the same digit.
///
/// Pure and O(`DIGIT_COUNT`). Inputs are validated before they get here;
/// this only compares position by position over equal-length strings.
/// A return value of `DIGIT_COUNT` is a winning guess.
pub fn exact_matches(secret: &str, guess: &str) -> usize {
    secret
        .bytes()
        .zip(guess.bytes())
        .filter(|(s, g)| s == g)
        .count()
}

/// Checks that a secret or guess is exactly four ASCII digits whose value
/// lies in `[MIN_SECRET, MAX_SECRET]`.
pub fn validate_number(value: &str) -> bool {
    if value.len() != DIGIT_COUNT || !value.bytes().all(|b| b.is_ascii_digit())
    {
        return false;
    }
    match value.parse::<u32>() {
        Ok(n) => (MIN_SECRET..=MAX_SECRET).contains(&n),
        Err(_) => false,
    }
}

/// Generates a random room code: `ROOM_CODE_LENGTH` uppercase alphanumerics.
///
/// Uniqueness is the registry's job (it retries on collision); this is just
/// the raw generator.
pub fn gen_room_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

/// Generates a reconnect token: `TOKEN_LENGTH` mixed-case alphanumerics,
/// ~190 bits of entropy. The token is the seat's only credential, so it
/// must be unguessable.
pub fn gen_token() -> String {
    const CHARS: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

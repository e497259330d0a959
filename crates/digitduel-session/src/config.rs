//! Session-layer timing knobs.

use std::time::Duration;

use tracing::warn;

/// Configuration for turn timeouts and idle-room reclamation.
///
/// Sensible defaults are provided; each field can also be overridden
/// through the environment (see [`SessionConfig::from_env`]).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long the seat on turn has to guess before its turn is
    /// forfeited. `Duration::ZERO` disables turn timers entirely.
    ///
    /// Default: 60 seconds.
    pub turn_timeout: Duration,

    /// A room with no state-changing event for this long is removed by
    /// the idle sweep.
    ///
    /// Default: 30 minutes.
    pub idle_timeout: Duration,

    /// How often the idle sweep runs.
    ///
    /// Default: 60 seconds.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// Builds a config from the environment, falling back to defaults:
    ///
    /// - `TURN_TIMEOUT_SECONDS` (0 disables turn timers)
    /// - `ROOM_IDLE_SECONDS`
    /// - `SWEEP_INTERVAL_SECONDS`
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            turn_timeout: secs_from_env(
                "TURN_TIMEOUT_SECONDS",
                defaults.turn_timeout,
            ),
            idle_timeout: secs_from_env(
                "ROOM_IDLE_SECONDS",
                defaults.idle_timeout,
            ),
            sweep_interval: secs_from_env(
                "SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval,
            ),
        }
    }
}

fn secs_from_env(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable duration");
                default
            }
        },
        Err(_) => default,
    }
}

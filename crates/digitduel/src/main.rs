//! DigitDuel server binary.
//!
//! Configuration comes from the environment:
//!
//! - `DIGITDUEL_ADDR` — listen address (default `127.0.0.1:8080`)
//! - `TURN_TIMEOUT_SECONDS`, `ROOM_IDLE_SECONDS`, `SWEEP_INTERVAL_SECONDS`
//!   — see `SessionConfig::from_env`
//! - `RUST_LOG` — tracing filter (default `info`)

use digitduel::{DigitDuelError, DigitDuelServer};
use digitduel_session::SessionConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), DigitDuelError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("DIGITDUEL_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let server = DigitDuelServer::builder()
        .bind(&addr)
        .session_config(SessionConfig::from_env())
        .build()
        .await?;

    server.run().await
}

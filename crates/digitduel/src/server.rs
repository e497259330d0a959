//! `DigitDuelServer` builder and accept loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use digitduel_protocol::{ConnectionId, JsonCodec};
use digitduel_room::RoomRegistry;
use digitduel_session::{SessionConfig, SessionManager};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::gateway::WsGateway;
use crate::handler::handle_connection;
use crate::DigitDuelError;

/// Counter for unique connection ids across the process lifetime.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared server state handed to each connection task.
pub(crate) struct ServerState {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) gateway: Arc<WsGateway>,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a DigitDuel server.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), digitduel::DigitDuelError> {
/// let server = digitduel::DigitDuelServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct DigitDuelServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
}

impl DigitDuelServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Overrides the timing configuration (turn timeout, idle sweep).
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener and wires the layers together.
    pub async fn build(self) -> Result<DigitDuelServer, DigitDuelError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "listening");

        let gateway = Arc::new(WsGateway::new());
        let sessions = SessionManager::new(
            Arc::new(RoomRegistry::new()),
            self.session_config,
            gateway.clone(),
        );

        Ok(DigitDuelServer {
            listener,
            state: Arc::new(ServerState {
                sessions,
                gateway,
                codec: JsonCodec,
            }),
        })
    }
}

impl Default for DigitDuelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running DigitDuel server. Call [`run`](Self::run) to start
/// accepting connections.
pub struct DigitDuelServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl DigitDuelServer {
    pub fn builder() -> DigitDuelServerBuilder {
        DigitDuelServerBuilder::new()
    }

    /// The bound address; useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated. Also starts
    /// the idle-room sweeper.
    pub async fn run(self) -> Result<(), DigitDuelError> {
        info!("DigitDuel server running");
        let _sweeper = self.state.sessions.spawn_sweeper();

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = ConnectionId::new(
                        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                    );
                    debug!(%conn, %addr, "accepted");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, conn, state).await
                        {
                            debug!(%conn, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

//! Per-connection handler: one task per accepted WebSocket.
//!
//! The socket is split: reads happen here, writes go through the
//! connection's unbounded channel, drained by a writer task. Events are
//! handled synchronously between frames — decode, one `SessionManager`
//! call, dispatch — so per-connection ordering matches arrival order.

use std::sync::Arc;

use digitduel_protocol::{ClientEvent, Codec, ConnectionId, ServerEvent};
use digitduel_session::{dispatch, Broadcaster, Outbound};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use crate::server::ServerState;
use crate::DigitDuelError;

/// Handles a single connection from WebSocket accept to close. Cleanup
/// (session disconnect, gateway unregister) always runs on the way out.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    conn: ConnectionId,
    state: Arc<ServerState>,
) -> Result<(), DigitDuelError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut frames) = ws.split();

    let (tx, mut rx) = unbounded_channel::<Message>();
    state.gateway.register(conn, tx);
    // Ends when the gateway drops the sender side in unregister().
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    debug!(%conn, "connection open");

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_event(&state, conn, text.as_str());
            }
            Ok(Message::Close(_)) => break,
            // Binary and ping/pong frames carry no events.
            Ok(_) => continue,
            Err(e) => {
                debug!(%conn, error = %e, "read error, closing");
                break;
            }
        }
    }

    let (room, outbound) = state.sessions.handle_disconnect(conn);
    if let Some(room) = &room {
        state.gateway.unsubscribe(room, conn);
    }
    state.gateway.unregister(conn);
    dispatch(state.gateway.as_ref(), outbound);
    let _ = writer.await;

    info!(%conn, "connection closed");
    Ok(())
}

/// Decodes and runs one inbound event. Failures become an `error` event
/// to the sender alone; the room never sees another player's mistakes.
fn handle_event(state: &ServerState, conn: ConnectionId, text: &str) {
    trace!(%conn, frame = text, "inbound");
    let event: ClientEvent = match state.codec.decode(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(%conn, error = %e, "undecodable frame");
            state.gateway.send(
                conn,
                ServerEvent::Error {
                    message: "Malformed event.".into(),
                },
            );
            return;
        }
    };

    let result = run_event(state, conn, event);
    match result {
        Ok(outbound) => dispatch(state.gateway.as_ref(), outbound),
        Err(err) => state.gateway.send(
            conn,
            ServerEvent::Error {
                message: err.to_string(),
            },
        ),
    }
}

fn run_event(
    state: &ServerState,
    conn: ConnectionId,
    event: ClientEvent,
) -> Result<Vec<Outbound>, digitduel_room::GameError> {
    let sessions = &state.sessions;
    match event {
        ClientEvent::CreateRoom => sessions.create_room(conn),
        ClientEvent::JoinRoom {
            room_id,
            slot,
            token,
            name,
        } => {
            let outcome = sessions.join_room(
                conn,
                &room_id,
                slot,
                token.as_deref(),
                name,
            )?;
            // Membership changes before the outbound batch goes out, so
            // the joiner sees its own join broadcasts.
            if let Some(prev) = outcome.displaced {
                state.gateway.unsubscribe(&outcome.room, prev);
            }
            if let Some(old) = &outcome.left {
                state.gateway.unsubscribe(old, conn);
            }
            state.gateway.subscribe(&outcome.room, conn);
            Ok(outcome.outbound)
        }
        ClientEvent::LeaveRoom { room_id, slot } => {
            let (room, outbound) = sessions.leave_room(conn, &room_id, slot)?;
            state.gateway.unsubscribe(&room, conn);
            Ok(outbound)
        }
        ClientEvent::SetSecret {
            room_id,
            slot,
            secret,
        } => sessions.set_secret(conn, &room_id, slot, &secret),
        ClientEvent::ResetSecret { room_id, slot } => {
            sessions.reset_secret(conn, &room_id, slot)
        }
        ClientEvent::StartGame { room_id } => sessions.start_game(&room_id),
        ClientEvent::SubmitGuess {
            room_id,
            slot,
            guess,
        } => sessions.submit_guess(conn, &room_id, slot, &guess),
        ClientEvent::NewGame { room_id } => sessions.new_game(&room_id),
    }
}

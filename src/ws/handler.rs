//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::{thread_rng, Rng};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{Intent, PlayerInput};
use crate::util::rate_limit::{ConnectionRateLimiter, FireVerdict};
use crate::util::time::unix_millis;
use crate::ws::names::{resolve_name, NamingStrikes, StrikeOutcome};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Register before anything can target this connection
    let direct_rx = state.sessions.register(conn_id);
    let snapshot_rx = state.arena.subscribe();
    let input_tx = state.arena.input_tx.clone();

    run_session(conn_id, ws_sink, ws_stream, input_tx, snapshot_rx, direct_rx).await;

    state.sessions.remove(&conn_id);
    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Why the reader loop stopped
enum SessionEnd {
    Closed,
    Kicked,
}

/// What the reader does with one parsed client message
#[derive(Debug)]
enum Action {
    /// Hand the intent to the arena
    Forward(Intent),
    /// Answer this connection only
    Reply(ServerMsg),
    Skip,
    /// Drop the connection, optionally after a last message
    Kick(Option<ServerMsg>),
}

/// Moderation and rate checks for one client message
fn decide<R: Rng + ?Sized>(
    conn_id: Uuid,
    msg: ClientMsg,
    rate_limiter: &ConnectionRateLimiter,
    strikes: &mut NamingStrikes,
    rng: &mut R,
) -> Action {
    match msg {
        ClientMsg::JoinGame { name } => match resolve_name(name.as_deref(), rng) {
            Ok(name) => Action::Forward(Intent::Join { name }),
            Err(reason) => {
                debug!(conn_id = %conn_id, reason = %reason, "Rejected name");
                match strikes.strike() {
                    StrikeOutcome::Retry(message) => Action::Reply(ServerMsg::ErrorMsg { message }),
                    StrikeOutcome::Disconnect(message) => {
                        warn!(conn_id = %conn_id, "Disconnecting for repeated naming violations");
                        Action::Kick(Some(ServerMsg::ErrorMsg { message }))
                    }
                }
            }
        },
        ClientMsg::Input {
            move_x,
            move_y,
            sprint,
            angle,
        } => Action::Forward(Intent::Input {
            move_x,
            move_y,
            sprint,
            angle,
        }),
        ClientMsg::Fire { angle } => match rate_limiter.check_fire() {
            FireVerdict::Allowed => Action::Forward(Intent::Fire { angle }),
            FireVerdict::Dropped => Action::Skip,
            FireVerdict::Abusive => {
                warn!(conn_id = %conn_id, "Disconnecting for fire flooding");
                Action::Kick(None)
            }
        },
        ClientMsg::Rematch => Action::Forward(Intent::Rematch),
    }
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let mut strikes = NamingStrikes::default();
    // Messages the reader wants delivered ahead of anything else
    let (local_tx, mut local_rx) = mpsc::channel::<ServerMsg>(8);
    let resync_tx = input_tx.clone();

    // Writer task: targeted + broadcast -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                local = local_rx.recv() => match local {
                    Some(msg) => msg,
                    // Reader finished; flush nothing more
                    None => break,
                },
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                broadcast = snapshot_rx.recv() => match broadcast {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Skipped events may include a map change or roster update
                        warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, requesting resync");
                        let resync = PlayerInput {
                            conn_id,
                            intent: Intent::Resync,
                            received_at: unix_millis(),
                        };
                        if resync_tx.try_send(resync).is_err() {
                            debug!(conn_id = %conn_id, "Resync request dropped");
                        }
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(conn_id = %conn_id, "Broadcast channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> arena
    let mut end = SessionEnd::Closed;
    while let Some(result) = ws_stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Received binary message, ignoring");
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !rate_limiter.check_message() {
            debug!(conn_id = %conn_id, "Rate limited message");
            continue;
        }

        let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                continue;
            }
        };

        let action = decide(conn_id, client_msg, &rate_limiter, &mut strikes, &mut thread_rng());
        let intent = match action {
            Action::Forward(intent) => intent,
            Action::Reply(msg) => {
                let _ = local_tx.send(msg).await;
                continue;
            }
            Action::Skip => continue,
            Action::Kick(last) => {
                if let Some(msg) = last {
                    let _ = local_tx.send(msg).await;
                }
                end = SessionEnd::Kicked;
                break;
            }
        };

        let input = PlayerInput {
            conn_id,
            intent,
            received_at: unix_millis(),
        };
        if input_tx.send(input).await.is_err() {
            debug!(conn_id = %conn_id, "Input channel closed");
            break;
        }
    }

    // Signal disconnect to the arena
    let _ = input_tx
        .send(PlayerInput {
            conn_id,
            intent: Intent::Disconnect,
            received_at: unix_millis(),
        })
        .await;

    match end {
        SessionEnd::Kicked => {
            // Let the final error reach the client before closing
            drop(local_tx);
            if let Err(e) = writer_handle.await {
                error!(conn_id = %conn_id, error = %e, "Writer task failed");
            }
        }
        SessionEnd::Closed => writer_handle.abort(),
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::rate_limit::FIRE_VIOLATION_BUDGET;
    use crate::ws::names::MAX_NAME_ATTEMPTS;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn join(name: &str) -> ClientMsg {
        ClientMsg::JoinGame {
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_valid_join_is_forwarded() {
        let limiter = ConnectionRateLimiter::new();
        let mut strikes = NamingStrikes::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let action = decide(Uuid::new_v4(), join("  Ace "), &limiter, &mut strikes, &mut rng);
        assert!(matches!(action, Action::Forward(Intent::Join { name }) if name == "Ace"));
    }

    #[test]
    fn test_repeated_bad_names_kick_connection() {
        let conn_id = Uuid::new_v4();
        let limiter = ConnectionRateLimiter::new();
        let mut strikes = NamingStrikes::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 1..MAX_NAME_ATTEMPTS {
            let action = decide(conn_id, join("fuck_this"), &limiter, &mut strikes, &mut rng);
            assert!(matches!(action, Action::Reply(ServerMsg::ErrorMsg { .. })));
        }

        let action = decide(conn_id, join("fuck_this"), &limiter, &mut strikes, &mut rng);
        assert!(matches!(
            action,
            Action::Kick(Some(ServerMsg::ErrorMsg { message }))
                if message == "Disconnected for repeated naming violations."
        ));
    }

    #[test]
    fn test_fire_flood_kicks_connection() {
        let conn_id = Uuid::new_v4();
        let limiter = ConnectionRateLimiter::new();
        let mut strikes = NamingStrikes::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let fire = || ClientMsg::Fire { angle: Some(0.0) };

        let first = decide(conn_id, fire(), &limiter, &mut strikes, &mut rng);
        assert!(matches!(first, Action::Forward(Intent::Fire { angle: Some(_) })));

        let mut actions = Vec::new();
        for _ in 0..(FIRE_VIOLATION_BUDGET + 5) {
            actions.push(decide(conn_id, fire(), &limiter, &mut strikes, &mut rng));
        }
        assert!(actions.iter().any(|a| matches!(a, Action::Skip)));
        assert!(matches!(actions.last(), Some(Action::Kick(None))));
    }
}

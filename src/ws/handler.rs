//! WebSocket upgrade handler and per-connection session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::config::INPUT_EXPIRE_IN_MS;
use crate::game::PlayerInput;
use crate::matchmaking::{hash_token, parse_slot_from_player_id};
use crate::store::keys::{input_key, player_key};
use crate::store::models::PlayerRecord;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for a WebSocket connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub match_id: String,
    pub player_id: String,
    pub token: String,
}

/// WebSocket upgrade handler. The token is checked against the stored hash
/// before the upgrade; slot assignment is trusted from matchmaking.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = parse_slot_from_player_id(&query.player_id) else {
        return unauthorized();
    };

    let record = match state
        .store
        .get::<PlayerRecord>(&player_key(&query.match_id, slot))
        .await
    {
        Ok(entry) => entry.value,
        Err(err) => {
            error!(match_id = %query.match_id, %err, "player lookup failed");
            return unauthorized();
        }
    };

    let authorized = record.is_some_and(|record| {
        record.player_id == query.player_id && record.token_hash == hash_token(&query.token)
    });
    if !authorized {
        warn!(match_id = %query.match_id, player_id = %query.player_id, "WebSocket auth failed");
        return unauthorized();
    }

    info!(match_id = %query.match_id, slot, "WebSocket upgrade for authenticated player");
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.match_id, slot))
}

fn unauthorized() -> Response {
    Response::builder()
        .status(401)
        .body("Unauthorized".into())
        .unwrap()
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, match_id: String, slot: usize) {
    let room = state.rooms.get(&match_id);
    // A connection is what makes this instance care about the match: start
    // competing for its lease if we aren't already.
    state.coordinators.ensure(&match_id, room.connection_gauge());
    room.add_connection();

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Welcome plus the latest known frame, so the world renders immediately.
    let welcome = serde_json::to_string(&ServerMsg::ServerWelcome { slot })
        .expect("welcome message serializes");
    if ws_sink.send(Message::Text(welcome.clone())).await.is_err() {
        room.remove_connection();
        return;
    }
    if let Some(bytes) = room.last_snapshot() {
        let _ = ws_sink.send(Message::Binary(bytes.to_vec())).await;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
    let mut snapshot_rx = room.subscribe();

    // Writer task: snapshot broadcast + control replies -> socket.
    let writer_match_id = match_id.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                snapshot = snapshot_rx.recv() => match snapshot {
                    Ok(bytes) => {
                        if ws_sink.send(Message::Binary(bytes.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Slow consumer: newer frames supersede missed ones.
                        warn!(match_id = %writer_match_id, lagged = n, "client lagged behind snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                control = out_rx.recv() => match control {
                    Some(text) => {
                        if ws_sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    // Reader loop: socket -> input records in the store.
    let rate_limiter = PlayerRateLimiter::new();
    let mut last_input_sig = String::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(%match_id, slot, "rate limited input message");
                    continue;
                }
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(%match_id, slot, %err, "failed to parse client message");
                        continue;
                    }
                };
                match msg {
                    ClientMsg::ClientHello { .. } => {
                        let _ = out_tx.send(welcome.clone()).await;
                    }
                    ClientMsg::ClientInput { seq, move_dir, aim_dir, fire } => {
                        let sig = format!("{move_dir}|{aim_dir}|{}", fire as u8);
                        if sig == last_input_sig {
                            continue;
                        }
                        last_input_sig = sig;

                        let input = PlayerInput {
                            seq,
                            move_dir,
                            aim_dir,
                            fire,
                            ts: unix_millis(),
                        };
                        if let Err(err) = state
                            .store
                            .set_with_ttl(&input_key(&match_id, slot), &input, INPUT_EXPIRE_IN_MS)
                            .await
                        {
                            // Transient: the next input change retries.
                            warn!(%match_id, slot, %err, "failed to store input");
                            last_input_sig.clear();
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%match_id, slot, "received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(%match_id, slot, "keepalive");
            }
            Ok(Message::Close(_)) => {
                info!(%match_id, slot, "client initiated close");
                break;
            }
            Err(err) => {
                error!(%match_id, slot, %err, "WebSocket error");
                break;
            }
        }
    }

    writer.abort();
    room.remove_connection();
    info!(%match_id, slot, "WebSocket connection closed");
}

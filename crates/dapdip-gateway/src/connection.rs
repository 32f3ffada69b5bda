use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::broadcast;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dapdip_db::Database;
use dapdip_types::api::Claims;
use dapdip_types::events::{StreamCommand, StreamEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Clients must send `Identify` within this window or the socket is closed.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_CHAT_LEN: usize = 500;

#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

/// Handle a single gateway WebSocket connection: Identify handshake, then
/// the join/chat/leave event loop.
pub async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();

    let identified = timeout(
        IDENTIFY_TIMEOUT,
        wait_for_identify(&mut receiver, &state.jwt_secret),
    )
    .await;

    let (user_id, username) = match identified {
        Ok(Some(id)) => id,
        _ => {
            warn!("gateway client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to the chat gateway", username, user_id);

    let ready = StreamEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, state, user_id, username).await;
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        // The first text frame must be a valid Identify.
        let Ok(StreamCommand::Identify { token }) = serde_json::from_str(&text) else {
            return None;
        };

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;

        return Some((data.claims.sub, data.claims.username));
    }
    None
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    state: GatewayState,
    user_id: Uuid,
    username: String,
) {
    let mut broadcast_rx = state.dispatcher.subscribe();
    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut joined: Option<Uuid> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        // Only forward events for the stream this client joined.
                        let Some(scope) = event.stream_id() else { continue };
                        if joined != Some(scope) {
                            continue;
                        }
                        let ended = matches!(event, StreamEvent::StreamEnded { .. });
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                        if ended {
                            joined = None;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("{} lagged on gateway events, skipped {}", username, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let cmd = match serde_json::from_str::<StreamCommand>(&text) {
                            Ok(cmd) => cmd,
                            Err(e) => {
                                debug!("bad gateway command from {}: {}", username, e);
                                let event = StreamEvent::Error {
                                    message: "malformed command".into(),
                                };
                                if send_event(&mut sender, &event).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let alive = handle_command(
                            cmd, &mut sender, &state, &mut joined, user_id, &username,
                        )
                        .await;
                        if !alive {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // Disconnect cleanup — the socket is gone, but viewers must be told.
    if let Some(stream_id) = joined {
        leave_stream(&state, stream_id, user_id, &username).await;
    }
    info!("{} ({}) disconnected from the chat gateway", username, user_id);
}

/// Returns false when the socket is dead and the loop should end.
async fn handle_command(
    cmd: StreamCommand,
    sender: &mut SplitSink<WebSocket, Message>,
    state: &GatewayState,
    joined: &mut Option<Uuid>,
    user_id: Uuid,
    username: &str,
) -> bool {
    match cmd {
        StreamCommand::Identify { .. } => {
            debug!("{} re-sent Identify, ignoring", username);
            true
        }

        StreamCommand::Join { stream_id } => {
            let db = state.db.clone();
            let sid = stream_id.to_string();
            let stream = tokio::task::spawn_blocking(move || db.get_stream(&sid)).await;

            let live = match stream {
                Ok(Ok(Some(row))) => row.live,
                Ok(Ok(None)) => false,
                Ok(Err(e)) => {
                    error!("stream lookup failed: {}", e);
                    false
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    false
                }
            };

            if !live {
                let event = StreamEvent::Error {
                    message: "stream not found or ended".into(),
                };
                return send_event(sender, &event).await.is_ok();
            }

            if let Some(previous) = joined.take() {
                leave_stream(state, previous, user_id, username).await;
            }

            let count = state
                .dispatcher
                .join(stream_id, user_id, username.to_string())
                .await;
            *joined = Some(stream_id);

            let db = state.db.clone();
            let (row_id, sid, uid) = (
                Uuid::new_v4().to_string(),
                stream_id.to_string(),
                user_id.to_string(),
            );
            match tokio::task::spawn_blocking(move || db.participant_join(&row_id, &sid, &uid))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("participant row write failed: {}", e),
                Err(e) => error!("spawn_blocking join error: {}", e),
            }

            state.dispatcher.broadcast(StreamEvent::ViewerJoined {
                stream_id,
                user_id,
                username: username.to_string(),
            });
            state
                .dispatcher
                .broadcast(StreamEvent::ViewerCount { stream_id, count });
            true
        }

        StreamCommand::Leave => {
            if let Some(stream_id) = joined.take() {
                leave_stream(state, stream_id, user_id, username).await;
            }
            true
        }

        StreamCommand::Chat { content } => {
            let Some(stream_id) = *joined else {
                let event = StreamEvent::Error {
                    message: "join a stream before chatting".into(),
                };
                return send_event(sender, &event).await.is_ok();
            };

            let content = content.trim().to_string();
            if content.is_empty() || content.len() > MAX_CHAT_LEN {
                let event = StreamEvent::Error {
                    message: format!("chat messages must be 1-{} characters", MAX_CHAT_LEN),
                };
                return send_event(sender, &event).await.is_ok();
            }

            let message_id = Uuid::new_v4();
            let now = chrono::Utc::now();

            let db = state.db.clone();
            let (mid, sid, uid, body) = (
                message_id.to_string(),
                stream_id.to_string(),
                user_id.to_string(),
                content.clone(),
            );
            let persisted = tokio::task::spawn_blocking(move || {
                db.insert_stream_message(&mid, &sid, &uid, &body)
            })
            .await;

            match persisted {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("failed to persist chat message: {}", e);
                    let event = StreamEvent::Error {
                        message: "message not delivered".into(),
                    };
                    return send_event(sender, &event).await.is_ok();
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return true;
                }
            }

            state.dispatcher.broadcast(StreamEvent::ChatMessage {
                id: message_id,
                stream_id,
                author_id: user_id,
                author_username: username.to_string(),
                content,
                timestamp: now,
            });
            true
        }
    }
}

/// Shared leave path for explicit Leave, implicit re-Join, and disconnect.
async fn leave_stream(state: &GatewayState, stream_id: Uuid, user_id: Uuid, username: &str) {
    let count = state.dispatcher.leave(stream_id, user_id).await;

    let db = state.db.clone();
    let (sid, uid) = (stream_id.to_string(), user_id.to_string());
    match tokio::task::spawn_blocking(move || db.participant_leave(&sid, &uid)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("participant row update failed: {}", e),
        Err(e) => error!("spawn_blocking join error: {}", e),
    }

    state.dispatcher.broadcast(StreamEvent::ViewerLeft {
        stream_id,
        user_id,
        username: username.to_string(),
    });
    state
        .dispatcher
        .broadcast(StreamEvent::ViewerCount { stream_id, count });
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &StreamEvent,
) -> Result<(), axum::Error> {
    sender
        .send(Message::Text(
            serde_json::to_string(event).unwrap().into(),
        ))
        .await
}

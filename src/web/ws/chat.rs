//! Chat WebSocket handler.
//!
//! Each connection authenticates with the `token` query parameter, joins the
//! group of the conversation named in the path and then relays frames both
//! ways until either side goes away.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::chat::{ChatHub, ChatSession, EventReceiver, RejectReason};

/// Query parameters for WebSocket connection.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Signed bearer token.
    pub token: Option<String>,
}

/// WebSocket chat handler.
///
/// GET /ws/chat/{conversation_id}?token={jwt}
///
/// The upgrade is always accepted; a rejected credential is reported with a
/// close frame carrying one of the 4000-4003 codes.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(hub): State<Arc<ChatHub>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, conversation_id, query.token))
}

async fn handle_socket(
    mut socket: WebSocket,
    hub: Arc<ChatHub>,
    conversation_id: String,
    token: Option<String>,
) {
    let now = chrono::Utc::now().timestamp();
    let idle_timeout = hub.idle_timeout();

    match ChatSession::establish(hub, token.as_deref(), &conversation_id, now).await {
        Ok((session, events)) => {
            let (ws_sender, ws_receiver) = socket.split();
            relay(&session, events, ws_sender, ws_receiver, idle_timeout).await;
            session.close().await;
        }
        Err(reason) => reject(&mut socket, reason).await,
    }
}

async fn reject(socket: &mut WebSocket, reason: RejectReason) {
    tracing::debug!(code = reason.close_code(), %reason, "closing rejected connection");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: reason.close_code(),
            reason: reason.as_str().into(),
        })))
        .await;
}

enum Inbound {
    Frame(Message),
    Gone,
    Idle,
}

async fn next_inbound(
    ws_receiver: &mut SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) -> Inbound {
    let next = async {
        match ws_receiver.next().await {
            Some(Ok(msg)) => Inbound::Frame(msg),
            Some(Err(e)) => {
                tracing::debug!("WebSocket error: {}", e);
                Inbound::Gone
            }
            None => Inbound::Gone,
        }
    };

    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, next)
            .await
            .unwrap_or(Inbound::Idle),
        None => next.await,
    }
}

/// Relay frames until the client leaves.
///
/// The idle timer covers both directions: it restarts on every inbound frame
/// and on every group event forwarded to the client, so a silent member of a
/// busy conversation stays connected.
async fn relay(
    session: &ChatSession,
    mut events: EventReceiver,
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut ws_receiver: SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) {
    loop {
        tokio::select! {
            inbound = next_inbound(&mut ws_receiver, idle_timeout) => {
                match inbound {
                    Inbound::Frame(Message::Text(text)) => {
                        session.on_text(&text).await;
                    }
                    Inbound::Frame(Message::Ping(data)) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Inbound::Frame(Message::Close(_)) => {
                        tracing::debug!(session_id = session.id(), "WebSocket closed by client");
                        break;
                    }
                    Inbound::Frame(_) => {}
                    Inbound::Gone => break,
                    Inbound::Idle => {
                        tracing::info!(session_id = session.id(), "closing idle connection");
                        let _ = ws_sender
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AWAY,
                                reason: "idle timeout".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match event.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to encode event");
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id = session.id(), skipped, "connection lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

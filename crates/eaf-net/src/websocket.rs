//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "WebSocket endpoint relaying session ticks and answering pings."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::future::pending;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use eaf_common::now_ms;
use eaf_msg::{
    decode, encode, log_message, ClientMessage, Inbound, MessageDirection, PongPayload,
    ServerMessage,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::ServerState;
use crate::session::{Frame, Subscription};

/// Optional query string accepted on upgrade, e.g. `/ws?session=heat-42`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub session: Option<String>,
}

pub(crate) async fn upgrade_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state, params.session))
}

struct Connection {
    id: Uuid,
    state: Arc<ServerState>,
    subscription: Option<Subscription>,
}

impl Connection {
    fn session_key(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .map(|subscription| subscription.session().key())
    }

    /// Attach to `key` and build the snapshot reply.
    fn subscribe(&mut self, key: &str) -> ServerMessage {
        let key = key.trim();
        if key.is_empty() {
            return ServerMessage::error("sessionKey must not be empty");
        }
        // Release the previous session before attaching to a new one.
        self.subscription = None;
        match self.state.registry.subscribe(key) {
            Ok(subscription) => {
                let snapshot = subscription.session().snapshot();
                self.subscription = Some(subscription);
                info!(connection = %self.id, session = %key, "connection subscribed");
                ServerMessage::HeatData(snapshot)
            }
            Err(err) => {
                warn!(connection = %self.id, session = %key, error = %err, "session creation failed");
                ServerMessage::error(err.to_string())
            }
        }
    }

    /// Handle one inbound text frame; returns the direct reply, if any.
    fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        let message = match decode::<ClientMessage>(text) {
            Ok(Inbound::Message(message)) => message,
            Ok(Inbound::Unknown { kind }) => {
                debug!(connection = %self.id, %kind, "ignoring unknown message type");
                return None;
            }
            Err(err) => {
                self.state.metrics.malformed_messages.inc();
                warn!(connection = %self.id, error = %err, "dropping malformed message");
                return None;
            }
        };
        log_message(MessageDirection::Inbound, message.kind(), self.session_key());

        match message {
            ClientMessage::Subscribe(payload) => Some(self.subscribe(&payload.session_key)),
            ClientMessage::Ping(ping) => {
                self.state.metrics.pings.inc();
                Some(ServerMessage::Pong(PongPayload {
                    timestamp: ping.timestamp,
                    server_time: now_ms(),
                }))
            }
        }
    }
}

async fn client_loop(mut socket: WebSocket, state: Arc<ServerState>, session: Option<String>) {
    state.metrics.connections_active.inc();
    let mut connection = Connection {
        id: Uuid::new_v4(),
        state: Arc::clone(&state),
        subscription: None,
    };
    debug!(connection = %connection.id, "connection opened");

    if let Some(key) = session {
        let reply = connection.subscribe(&key);
        if !send(&mut socket, &connection, &reply).await {
            state.metrics.connections_active.dec();
            return;
        }
    }

    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
                break;
            }
            frame = next_broadcast(&mut connection.subscription) => {
                match frame {
                    Ok(text) => {
                        if socket.send(Message::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(connection = %connection.id, skipped, "subscriber lagged behind; dropping ticks");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        connection.subscription = None;
                    }
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    Message::Text(text) => {
                        if let Some(reply) = connection.handle_text(&text) {
                            if !send(&mut socket, &connection, &reply).await {
                                break;
                            }
                        }
                    }
                    Message::Binary(_) => {
                        state.metrics.malformed_messages.inc();
                        debug!(connection = %connection.id, "binary frames are not supported");
                    }
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }

    debug!(connection = %connection.id, session = ?connection.session_key(), "connection closed");
    drop(connection);
    state.metrics.connections_active.dec();
}

async fn send(socket: &mut WebSocket, connection: &Connection, message: &ServerMessage) -> bool {
    let text = match encode(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(connection = %connection.id, error = %err, "failed to encode reply");
            return true;
        }
    };
    log_message(MessageDirection::Outbound, message.kind(), connection.session_key());
    socket.send(Message::Text(text)).await.is_ok()
}

async fn next_broadcast(
    subscription: &mut Option<Subscription>,
) -> Result<Frame, broadcast::error::RecvError> {
    match subscription.as_mut() {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

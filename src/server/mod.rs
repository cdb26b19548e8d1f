//! WebSocket bridge server
//!
//! One task per connection. The first frame must authenticate within
//! [`AUTH_TIMEOUT`]; after that a routing loop handles frames in arrival
//! order while an independent heartbeat task shares the same outbound
//! channel, so a slow `message` exchange never delays heartbeats.
//! Cleanup (heartbeat abort, registry removal) runs exactly once on
//! every exit path.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use uuid::Uuid;

use kiro_bridge_core::auth::Authenticator;
use kiro_bridge_core::automation::Automation;
use kiro_bridge_core::protocol::{BridgeStatus, ClientKind, ClientMessage, ServerKind, ServerMessage};
use kiro_bridge_core::response::{ResponseRequest, ResponseSource};

/// How long a new connection gets to present its auth frame.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between server-initiated heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One authenticated connection.
struct Session {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    connected_at: Instant,
}

/// Server-wide connection state. `connected` holds every accepted
/// connection; `authenticated` only those past the auth handshake.
#[derive(Default)]
struct Registry {
    connected: HashSet<Uuid>,
    authenticated: HashMap<Uuid, Session>,
}

pub struct BridgeServer {
    auth: Authenticator,
    automation: Arc<dyn Automation>,
    response_source: Arc<dyn ResponseSource>,
    response_timeout: Duration,
    auth_timeout: Duration,
    heartbeat_interval: Duration,
    registry: Mutex<Registry>,
}

impl BridgeServer {
    pub fn new(
        auth: Authenticator,
        automation: Arc<dyn Automation>,
        response_source: Arc<dyn ResponseSource>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            automation,
            response_source,
            response_timeout,
            auth_timeout: AUTH_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Accept connections forever, one spawned task per client.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                match accept_async(stream).await {
                    Ok(ws_stream) => server.handle_connection(ws_stream, addr).await,
                    Err(e) => log::warn!("websocket handshake with {addr} failed: {e}"),
                }
            });
        }
    }

    /// Number of authenticated sessions right now.
    pub async fn connected_clients(&self) -> usize {
        self.registry.lock().await.authenticated.len()
    }

    /// Best-effort push to every authenticated session. A session whose
    /// transport is gone is evicted; the rest still receive the message.
    pub async fn broadcast(&self, kind: ServerKind) {
        let message = ServerMessage::new(kind);
        let mut registry = self.registry.lock().await;
        let mut dead = Vec::new();
        for (id, session) in registry.authenticated.iter() {
            if session.outbound.send(message.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            log::info!("dropping dead session {id} during broadcast");
            registry.authenticated.remove(&id);
            registry.connected.remove(&id);
        }
    }

    async fn handle_connection(&self, ws_stream: WebSocketStream<TcpStream>, addr: SocketAddr) {
        let session_id = Uuid::new_v4();
        log::info!("client connected: {addr}");
        self.registry.lock().await.connected.insert(session_id);
        self.log_registry().await;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        // Writer task: everything outbound (routing replies, heartbeats,
        // broadcasts) funnels through one channel onto the socket.
        let mut send_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::error!("failed to serialize outbound message: {e}"),
                }
            }
            let _ = ws_sender.close().await;
        });

        let mut heartbeat_task = None;

        if self.authenticate(&mut ws_receiver, &tx).await {
            self.registry.lock().await.authenticated.insert(
                session_id,
                Session {
                    outbound: tx.clone(),
                    connected_at: Instant::now(),
                },
            );
            log::info!("client authenticated: {addr}");
            self.log_registry().await;

            heartbeat_task = Some(tokio::spawn(heartbeat_loop(
                tx.clone(),
                self.heartbeat_interval,
            )));

            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Text(raw)) => self.route_message(session_id, &raw, &tx).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::info!("transport error from {addr}: {e}");
                        break;
                    }
                }
            }
            log::info!("client disconnected: {addr}");
        }

        // Single cleanup point for every exit path.
        if let Some(task) = heartbeat_task {
            task.abort();
        }
        drop(tx);
        {
            let mut registry = self.registry.lock().await;
            registry.connected.remove(&session_id);
            registry.authenticated.remove(&session_id);
        }
        self.log_registry().await;

        // Let the writer flush queued frames (auth errors in particular)
        // before giving up on it.
        if tokio::time::timeout(Duration::from_secs(5), &mut send_task)
            .await
            .is_err()
        {
            send_task.abort();
        }
    }

    /// First-frame handshake. Returns true only on a valid auth frame;
    /// every failure queues its reply and leaves closing to the caller.
    async fn authenticate(
        &self,
        receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
        tx: &mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        let raw = match tokio::time::timeout(self.auth_timeout, receiver.next()).await {
            Ok(Some(Ok(Message::Text(raw)))) => raw,
            Ok(Some(Ok(_))) => {
                let _ = tx.send(ServerMessage::new(ServerKind::Error {
                    error: "invalid format".to_string(),
                }));
                return false;
            }
            Ok(Some(Err(e))) => {
                log::info!("transport error during auth: {e}");
                return false;
            }
            Ok(None) => return false,
            Err(_) => {
                let _ = tx.send(ServerMessage::new(ServerKind::Error {
                    error: "authentication timeout".to_string(),
                }));
                return false;
            }
        };

        let message: ClientMessage = match serde_json::from_str(&raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("undecodable auth frame: {e}");
                let _ = tx.send(ServerMessage::new(ServerKind::Error {
                    error: "invalid format".to_string(),
                }));
                return false;
            }
        };

        match message.kind {
            ClientKind::Auth { token } => {
                if self.auth.validate(&token) {
                    let _ = tx.send(ServerMessage::new(ServerKind::AuthResult {
                        success: true,
                        error: None,
                    }));
                    true
                } else {
                    let _ = tx.send(ServerMessage::new(ServerKind::AuthResult {
                        success: false,
                        error: Some("invalid token".to_string()),
                    }));
                    false
                }
            }
            _ => {
                let _ = tx.send(ServerMessage::new(ServerKind::Error {
                    error: "first message must be auth".to_string(),
                }));
                false
            }
        }
    }

    async fn route_message(
        &self,
        session_id: Uuid,
        raw: &str,
        tx: &mpsc::UnboundedSender<ServerMessage>,
    ) {
        let send = |kind: ServerKind| {
            let _ = tx.send(ServerMessage::new(kind));
        };

        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("undecodable frame: {e}");
                send(ServerKind::Error {
                    error: "invalid format".to_string(),
                });
                return;
            }
        };

        let message: ClientMessage = match serde_json::from_value(value.clone()) {
            Ok(message) => message,
            Err(e) => {
                // A known tag with a bad payload is a format problem; an
                // unknown tag gets named in the reply. Neither closes the
                // connection.
                let tag = value.get("type").and_then(|t| t.as_str());
                match tag {
                    Some(tag) if !ClientKind::KNOWN_TYPES.iter().any(|t| *t == tag) => {
                        send(ServerKind::Error {
                            error: format!("unknown message type: {tag}"),
                        });
                    }
                    _ => {
                        log::warn!("malformed payload: {e}");
                        send(ServerKind::Error {
                            error: "invalid format".to_string(),
                        });
                    }
                }
                return;
            }
        };

        match message.kind {
            ClientKind::Heartbeat {} => send(ServerKind::Heartbeat {}),
            ClientKind::StatusRequest {} => {
                let (connected_clients, uptime) = {
                    let registry = self.registry.lock().await;
                    let uptime = registry
                        .authenticated
                        .get(&session_id)
                        .map(|s| s.connected_at.elapsed().as_secs_f64())
                        .unwrap_or(0.0);
                    (registry.authenticated.len(), uptime)
                };
                // The process scan blocks; keep it off the async threads.
                let automation = self.automation.clone();
                let kiro_running = tokio::task::spawn_blocking(move || automation.is_running())
                    .await
                    .unwrap_or(false);
                send(ServerKind::Status {
                    status: BridgeStatus {
                        kiro_running,
                        connected_clients,
                        uptime,
                    },
                });
            }
            ClientKind::Message { content } => {
                self.handle_chat_message(content, tx).await;
            }
            ClientKind::Auth { .. } => send(ServerKind::Error {
                error: "unknown message type: auth".to_string(),
            }),
        }
    }

    /// The content-delivery path: inject into Kiro, ack, then relay the
    /// response from whichever acquisition strategy is configured.
    async fn handle_chat_message(&self, content: String, tx: &mpsc::UnboundedSender<ServerMessage>) {
        let send = |kind: ServerKind| {
            let _ = tx.send(ServerMessage::new(kind));
        };

        if content.is_empty() {
            send(ServerKind::Error {
                error: "message content is empty".to_string(),
            });
            return;
        }

        // Keystroke automation blocks for its settling delays; run it on
        // the blocking pool so other sessions keep moving.
        let automation = self.automation.clone();
        let text = content.clone();
        let delivered = tokio::task::spawn_blocking(move || automation.send_message(&text))
            .await
            .unwrap_or(false);
        if !delivered {
            send(ServerKind::Error {
                error: "failed to deliver message to Kiro".to_string(),
            });
            return;
        }

        send(ServerKind::MessageAck { success: true });

        let request = ResponseRequest {
            id: Uuid::new_v4().to_string(),
            content,
        };
        match self
            .response_source
            .await_response(&request, self.response_timeout)
            .await
        {
            Ok(content) => send(ServerKind::KiroResponse { content }),
            Err(e) => send(ServerKind::Error {
                error: e.to_string(),
            }),
        }
    }

    async fn log_registry(&self) {
        let registry = self.registry.lock().await;
        log::info!(
            "connections: {} total, {} authenticated",
            registry.connected.len(),
            registry.authenticated.len()
        );
    }
}

/// Periodic heartbeat into a session's outbound channel. Returns once
/// the session is gone and the channel is closed, so the task never
/// outlives its connection.
async fn heartbeat_loop(tx: mpsc::UnboundedSender<ServerMessage>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if tx.send(ServerMessage::new(ServerKind::Heartbeat {})).is_err() {
            break;
        }
    }
}

//! Wire protocol shared with the mobile client
//!
//! Every frame is a JSON object `{type, payload, timestamp}`. The tagged
//! payload is modeled as an adjacently-tagged serde enum flattened next to
//! the send-time timestamp, so the wire shape stays flat while the Rust
//! side gets an exhaustive match.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Seconds since the UNIX epoch, fractional, as the wire expects.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Client → server frame
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientMessage {
    #[serde(flatten)]
    pub kind: ClientKind,
    pub timestamp: f64,
}

impl ClientMessage {
    pub fn new(kind: ClientKind) -> Self {
        Self {
            kind,
            timestamp: unix_timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientKind {
    Auth { token: String },
    Message { content: String },
    StatusRequest {},
    Heartbeat {},
}

impl ClientKind {
    /// Tags a well-formed client may send. Used to tell an unknown tag
    /// apart from a known tag with a malformed payload.
    pub const KNOWN_TYPES: [&'static str; 4] =
        ["auth", "message", "status_request", "heartbeat"];
}

/// Server → client frame. Timestamp is assigned at construction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub kind: ServerKind,
    pub timestamp: f64,
}

impl ServerMessage {
    pub fn new(kind: ServerKind) -> Self {
        Self {
            kind,
            timestamp: unix_timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerKind {
    AuthResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    MessageAck {
        success: bool,
    },
    KiroResponse {
        content: String,
    },
    Status {
        status: BridgeStatus,
    },
    Error {
        error: String,
    },
    Heartbeat {},
}

/// Nested body of the `status` frame. The mobile client reads
/// `payload.status`, so the fields do not sit flat in the payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BridgeStatus {
    pub kiro_running: bool,
    pub connected_clients: usize,
    pub uptime: f64,
}

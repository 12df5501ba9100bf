//! Delivery channels behind one seam.
//!
//! The conversation logic never talks to the network directly: it goes
//! through [`ChatTransport`], which bundles the pull side (history, sends,
//! directory lookups over REST) and the push side (a persistent room-scoped
//! socket). Production uses [`http::RestTransport`]; tests inject a scripted
//! implementation through the same slot.

pub mod http;
pub(crate) mod socket;

use serde::{Deserialize, Serialize};

use crate::state::Role;

/// A message as the backend represents it, independent of any UI state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub body: String,
    pub created_at_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender: String,
    pub receiver: String,
    pub message: String,
}

/// Result of posting a message. The backend usually echoes the created row;
/// some deployments answer with a bare acknowledgment, in which case
/// `message` is `None` and the caller synthesizes a local id.
#[derive(Debug, Clone)]
pub struct SendAck {
    pub message: Option<WireMessage>,
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_online: Option<bool>,
    pub expertise: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushAuth {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub enum PushEvent {
    Connected,
    /// `exhausted` is set once the transport has given up retrying; the
    /// conversation then rides on polling alone until reopened.
    Disconnected { exhausted: bool },
    Message(WireMessage),
}

#[derive(Debug, Clone)]
pub enum PushCommand {
    EmitRoomMessage { message: WireMessage, room_id: String },
}

/// Live push channel for one room. Dropping the handle closes the socket and
/// stops the worker.
pub struct PushHandle {
    pub events: flume::Receiver<PushEvent>,
    pub commands: flume::Sender<PushCommand>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Full message history for a participant pair, oldest first as the
    /// server orders it.
    async fn fetch_history(
        &self,
        self_id: &str,
        other_id: &str,
    ) -> Result<Vec<WireMessage>, TransportError>;

    async fn post_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendAck, TransportError>;

    /// Directory of chat counterparts holding the given role.
    async fn fetch_directory(&self, role: Role) -> Result<Vec<DirectoryEntry>, TransportError>;

    /// Open the push channel for a room. Spawns its worker on `runtime`; the
    /// returned handle delivers events and accepts outgoing room messages.
    fn open_push(
        &self,
        runtime: &tokio::runtime::Handle,
        auth: PushAuth,
        room_id: &str,
    ) -> PushHandle;
}

/// Message row as serialized by the REST API and the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MessageDto {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Value>,
}

impl MessageDto {
    /// Rows without an `_id` cannot be deduplicated and are dropped.
    pub(crate) fn into_wire(self) -> Option<WireMessage> {
        let id = self.id?;
        let created_at_ms = self.created_at.as_ref().and_then(parse_timestamp_ms);
        Some(WireMessage {
            id,
            sender: self.sender,
            receiver: self.receiver,
            body: self.message,
            created_at_ms,
        })
    }

    pub(crate) fn from_wire(message: &WireMessage) -> Self {
        Self {
            id: Some(message.id.clone()),
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            message: message.body.clone(),
            created_at: message.created_at_ms.map(format_timestamp_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DirectoryEntryDto {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(rename = "isOnline", default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub expertise: Option<String>,
}

impl DirectoryEntryDto {
    pub(crate) fn into_entry(self) -> DirectoryEntry {
        DirectoryEntry {
            id: self.id,
            name: self.name.unwrap_or_default(),
            avatar_url: self.avatar,
            is_online: self.is_online,
            expertise: self.expertise,
        }
    }
}

/// The API emits RFC 3339 strings; older rows have been seen with raw epoch
/// millis. Anything else is treated as missing.
pub(crate) fn parse_timestamp_ms(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

pub(crate) fn format_timestamp_ms(ms: i64) -> serde_json::Value {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => serde_json::Value::String(
            dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        ),
        None => serde_json::Value::Number(ms.into()),
    }
}

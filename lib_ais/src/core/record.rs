//! # Connection Record
//!
//! State for one AIS Stream session, plus the views handed to HTTP clients.
//!
//! ## Status machine
//!
//! ```text
//!   connecting ──open──► connected ──handshake sent──► subscribed
//!        │                   │                            │
//!        └───────────────────┴──────────┬─────────────────┘
//!                                       ▼
//!                        disconnected (clean close) | error
//! ```
//!
//! `disconnected` and `error` are terminal for the socket that produced them. A
//! new `connect` always creates a fresh record under a fresh id.
//!
//! Writers: the supervisor task that owns the socket, and the dispatcher's
//! `disconnect` / `updateSubscription` handlers. Everything goes through
//! [`ConnectionRegistry`](super::ConnectionRegistry), which serializes writers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::error::{AisStreamError, Result};
use super::ring_buffer::MessageRingBuffer;

/// Opaque client-facing connection handle.
///
/// Freshly generated ids are UUID v4 strings. Lookups accept any string, so an
/// id that was never issued simply misses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generates a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Record created, socket open requested but not confirmed.
    Connecting,
    /// Socket open, handshake not yet sent.
    Connected,
    /// Handshake sent; inbound frames are subscription data.
    Subscribed,
    /// The socket closed cleanly.
    Disconnected,
    /// The socket failed. See `last_error`.
    Error,
}

impl ConnectionStatus {
    /// Whether the socket that produced this status is finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Subscribed => "subscribed",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instructions for the task that owns a connection's socket.
#[derive(Debug)]
pub enum TransportCommand {
    /// Send a text frame; the outcome is reported on `ack`.
    Send {
        frame: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop the task.
    Close,
}

/// The record's handle on its live socket.
///
/// The socket itself lives in the supervisor task; the record only keeps the
/// command sender. Dropping the last handle ends the task, which closes the socket.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
}

impl TransportHandle {
    /// Creates a handle and the receiving end the supervisor task will own.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    /// Asks the task to close the socket. Does not wait for the close to finish.
    pub fn request_close(&self) -> bool {
        self.commands.send(TransportCommand::Close).is_ok()
    }

    /// Hands a text frame to the socket task and waits for the send outcome.
    pub async fn send_frame(&self, frame: String) -> Result<()> {
        let (ack, outcome) = oneshot::channel();
        self.commands
            .send(TransportCommand::Send { frame, ack })
            .map_err(|_| AisStreamError::Transport("socket task is no longer running".to_string()))?;
        outcome
            .await
            .map_err(|_| AisStreamError::Transport("socket task dropped the request".to_string()))?
    }

    /// Whether the task on the other end is still listening.
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// One AIS Stream session.
pub struct ConnectionRecord {
    id: ConnectionId,
    status: ConnectionStatus,
    transport: Option<TransportHandle>,
    message_count: u64,
    recent_messages: MessageRingBuffer<Value>,
    last_message_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    last_error: Option<String>,
    api_key: String,
}

impl ConnectionRecord {
    /// A fresh record in `connecting`.
    pub fn new(id: ConnectionId, api_key: String, buffer_capacity: usize) -> Self {
        Self {
            id,
            status: ConnectionStatus::Connecting,
            transport: None,
            message_count: 0,
            recent_messages: MessageRingBuffer::with_capacity(buffer_capacity),
            last_message_at: None,
            started_at: Utc::now(),
            last_error: None,
            api_key,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn recent_messages(&self) -> &MessageRingBuffer<Value> {
        &self.recent_messages
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message_at
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// API key given at `connect`, reused when the subscription is updated.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Rotates the stored key after a resubscribe that carried its own.
    pub fn replace_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = api_key.into();
    }

    pub fn transport(&self) -> Option<&TransportHandle> {
        self.transport.as_ref()
    }

    pub fn attach_transport(&mut self, handle: TransportHandle) {
        self.transport = Some(handle);
    }

    /// Removes the transport handle, e.g. so `disconnect` can close it.
    pub fn take_transport(&mut self) -> Option<TransportHandle> {
        self.transport.take()
    }

    /// `connecting -> connected`. Returns false if the record was elsewhere.
    pub fn mark_connected(&mut self) -> bool {
        if self.status != ConnectionStatus::Connecting {
            return false;
        }
        self.status = ConnectionStatus::Connected;
        true
    }

    /// `connected -> subscribed`. Returns false if the record was elsewhere.
    pub fn mark_subscribed(&mut self) -> bool {
        if self.status != ConnectionStatus::Connected {
            return false;
        }
        self.status = ConnectionStatus::Subscribed;
        true
    }

    /// Clean close. Clears the transport handle.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ConnectionStatus::Disconnected;
        self.transport = None;
        true
    }

    /// Transport failure. The handle is left alone; `disconnect` may still close it.
    pub fn mark_error(&mut self, description: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ConnectionStatus::Error;
        self.last_error = Some(description.into());
        true
    }

    /// Accounts one successfully decoded inbound message.
    pub fn record_message(&mut self, message: Value, received_at: DateTime<Utc>) {
        self.message_count += 1;
        self.last_message_at = Some(received_at);
        self.recent_messages.append(message);
    }

    /// Full view including the last `window` buffered messages.
    pub fn snapshot(&self, window: usize) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id.clone(),
            status: self.status,
            message_count: self.message_count,
            last_message: self.last_message_at,
            start_time: self.started_at,
            recent_messages: self.recent_messages.snapshot(window),
            error: self.last_error.clone(),
        }
    }

    /// Counters and status only, no message bodies.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            status: self.status,
            message_count: self.message_count,
            last_message: self.last_message_at,
            start_time: self.started_at,
            error: self.last_error.clone(),
        }
    }
}

/// Single-connection status payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub status: ConnectionStatus,
    pub message_count: u64,
    pub last_message: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    pub recent_messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Entry in the all-connections status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub status: ConnectionStatus,
    pub message_count: u64,
    pub last_message: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

//! Typed events published by a connection session
//!
//! Subscribers receive these over a `tokio::sync::broadcast` channel; there
//! are no stringly-typed notification names anywhere in the core.

use std::fmt;

use codedeck_term::TextSpan;
use serde::Serialize;
use serde_json::Value;

/// Connection lifecycle state. Exactly one session owns one value at a
/// time and all transitions are serialized through the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal: retries exhausted or a non-retriable error occurred.
    Failed,
}

impl ConnectionState {
    /// Whether `connect` is accepted from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where an outbound command ended up, keyed by its `messageId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Buffered until the connection is established.
    Queued,
    /// Handed to the transport.
    Sent,
    /// Rejected; the caller must decide whether to retry.
    Failed,
}

/// Events emitted by one connection session. Serializable so embedders
/// can bridge them to a presentation layer as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionStateChanged {
        state: ConnectionState,
        /// Reconnect attempt count at the time of the transition, for
        /// operator-facing status ("retry 3 of 5").
        attempt: u32,
    },
    /// The backend allocated a session id for the conversation.
    SessionCreated { session_id: String },
    /// The backend confirmed an abort request.
    SessionAborted { session_id: Option<String> },
    /// A streamed message finished reassembly. Emitted exactly once per
    /// finalized stream.
    MessageReceived { key: String, content: String },
    /// Delivery progress for an outbound command.
    MessageStatusChanged {
        message_id: String,
        status: DeliveryStatus,
    },
    /// Structured tool event passed through verbatim.
    ToolUse { payload: serde_json::Map<String, Value> },
    /// Shell stream established.
    ShellStarted { session_id: Option<String> },
    /// One chunk of terminal output, raw and SGR-decoded.
    ShellOutput { data: String, spans: Vec<TextSpan> },
    ShellExit { code: Option<i32> },
    ShellClear,
    /// Non-fatal error (backend-reported or a single undecodable frame).
    ErrorOccurred { message: String },
    /// Terminal: the reconnection policy ran out of attempts. Emitted once.
    ReconnectExhausted { attempts: u32 },
}

//! Client → backend frames

use serde::{Deserialize, Serialize};

/// Frames sent from the client to the backend.
///
/// Optional fields are omitted from the wire when absent. The one exception
/// is [`OutboundFrame::ShellInit`]: the backend requires `sessionId` to be
/// present as JSON `null` when no shell session exists yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Chat command for a Claude session.
    #[serde(rename = "claude-command", rename_all = "camelCase")]
    ClaudeCommand {
        content: String,
        project_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Client-generated UUID, echoed back in delivery-status events.
        message_id: String,
    },

    /// Chat command for a Cursor session.
    #[serde(rename = "cursor-command", rename_all = "camelCase")]
    CursorCommand {
        content: String,
        project_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message_id: String,
    },

    /// Abort an in-flight session on the backend.
    #[serde(rename = "abort-session", rename_all = "camelCase")]
    AbortSession { session_id: String },

    /// Keepalive probe.
    #[serde(rename = "ping")]
    Ping,

    /// Keepalive reply.
    #[serde(rename = "pong")]
    Pong,

    /// Open a shell/terminal stream. `session_id` serializes as `null`
    /// when the shell is not resuming an existing session.
    #[serde(rename = "init", rename_all = "camelCase")]
    ShellInit {
        project_path: String,
        session_id: Option<String>,
        has_session: bool,
        provider: String,
        cols: u16,
        rows: u16,
    },

    /// Raw terminal input bytes (UTF-8).
    #[serde(rename = "input")]
    ShellInput { data: String },

    /// Terminal window resize.
    #[serde(rename = "resize")]
    ShellResize { cols: u16, rows: u16 },
}

impl OutboundFrame {
    /// Serialize to the wire JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The client-generated message ID, for frames that carry one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            OutboundFrame::ClaudeCommand { message_id, .. }
            | OutboundFrame::CursorCommand { message_id, .. } => Some(message_id),
            _ => None,
        }
    }
}

//! Backend → client frames and the decode path

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Frames received from the backend, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    /// Streamed chat content fragment.
    #[serde(rename = "claude-output")]
    ClaudeOutput { content: String },

    /// Streamed response fragment (alternate content key used by some
    /// backend versions).
    #[serde(rename = "claude-response")]
    ClaudeResponse { content: String },

    /// End-of-stream marker: the streamed message is complete.
    #[serde(rename = "claude-complete", rename_all = "camelCase")]
    ClaudeComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// Structured side-channel event (tool invocations etc). The payload
    /// shape varies per tool, so everything past `type` is kept as-is.
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(flatten)]
        payload: serde_json::Map<String, Value>,
    },

    /// The backend allocated a session for the active conversation.
    #[serde(rename = "session-created", rename_all = "camelCase")]
    SessionCreated { session_id: String },

    /// Acknowledgement of an `abort-session` request.
    #[serde(rename = "session-aborted", rename_all = "camelCase")]
    SessionAborted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Backend-reported error, local to one request.
    #[serde(rename = "error")]
    Error { error: String },

    /// Keepalive probe; must be answered with a `pong` frame.
    #[serde(rename = "ping")]
    Ping,

    /// Keepalive reply.
    #[serde(rename = "pong")]
    Pong,

    /// Shell stream established.
    #[serde(rename = "init", rename_all = "camelCase")]
    ShellInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Raw terminal output (may contain ANSI escape sequences).
    #[serde(rename = "output")]
    ShellOutput { data: String },

    /// Shell process exited.
    #[serde(rename = "exit")]
    ShellExit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },

    /// Clear the terminal display (and any carried style state).
    #[serde(rename = "clear")]
    ShellClear,
}

/// Result of decoding one raw wire payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A recognized typed frame.
    Frame(InboundFrame),
    /// Streamed content that arrived outside a typed frame: either the
    /// payload was not JSON at all, or it was JSON without a recognized
    /// `type` but carried a `data` field.
    Passthrough(String),
    /// Valid JSON the client does not understand and cannot salvage
    /// content from. Logged and dropped by the session layer.
    Unknown(Value),
}

/// Decode failures. JSON parse failure is deliberately NOT an error: the
/// backend streams raw text fragments over the same socket, so unparseable
/// text is forwarded as [`Decoded::Passthrough`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

/// Decode a text payload into a typed frame or passthrough content.
pub fn decode_text(raw: &str) -> Decoded {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Decoded::Passthrough(raw.to_string()),
    };

    match InboundFrame::deserialize(value.clone()) {
        Ok(frame) => Decoded::Frame(frame),
        Err(_) => match value.get("data").and_then(Value::as_str) {
            Some(data) => Decoded::Passthrough(data.to_string()),
            None => Decoded::Unknown(value),
        },
    }
}

/// Decode a binary payload. The only hard failure in the codec: bytes that
/// are not valid UTF-8 cannot be forwarded as content.
pub fn decode_bytes(raw: &[u8]) -> Result<Decoded, DecodeError> {
    Ok(decode_text(std::str::from_utf8(raw)?))
}

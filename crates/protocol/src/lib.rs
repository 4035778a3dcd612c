//! Codedeck Protocol
//!
//! Wire types for the persistent connection to a command-execution backend.
//! Frames are flat JSON objects discriminated by a `type` string; non-JSON
//! payloads are passed through as anonymous streamed content rather than
//! rejected, because the backend interleaves raw text fragments with typed
//! frames on the same socket.

use uuid::Uuid;

pub mod inbound;
pub mod outbound;

pub use inbound::{decode_bytes, decode_text, DecodeError, Decoded, InboundFrame};
pub use outbound::OutboundFrame;

/// Generate a client-side message ID used to correlate delivery-status
/// events for one outbound command.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

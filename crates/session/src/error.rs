//! Error taxonomy for the session core
//!
//! Retriability is decided in exactly one place: the session actor. These
//! types only classify; none of them trigger a reconnect by themselves.

use thiserror::Error;

use crate::events::ConnectionState;

#[derive(Debug, Error)]
pub enum SessionError {
    /// `send` attempted while disconnected or failed. The message is not
    /// silently parked in a queue that will never drain.
    #[error("not connected")]
    NotConnected,

    /// Outbound queue is at capacity; the command was rejected, not
    /// silently dropped.
    #[error("outbound queue full ({0} messages)")]
    QueueFull(usize),

    /// `connect` called from a state that does not accept it.
    #[error("connect is not valid while {0}")]
    InvalidState(ConnectionState),

    /// Handshake rejected due to the credential. Non-retriable.
    #[error("authentication rejected by backend")]
    Unauthorized,

    /// The reconnection policy exhausted its attempt budget.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// The session was closed while this call was pending.
    #[error("session closed")]
    Closed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// Transport-level delivery failure. Reported to the caller; reconnect
    /// decisions come only from transport closure, never from here.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session actor task is gone (shut down or panicked).
    #[error("session actor is no longer running")]
    ActorGone,
}

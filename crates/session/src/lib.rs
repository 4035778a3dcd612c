//! Codedeck Session
//!
//! The connection core for a command-execution backend: one actor task per
//! physical WebSocket connection, driving the connection state machine,
//! routing decoded frames to the stream reassembler or straight to
//! subscribers, draining the outbound queue on connect, and retrying
//! dropped connections under the reconnection policy. Two independent
//! sessions (chat/command and shell/terminal) are paired by the
//! [`coordinator::DualChannelCoordinator`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod queue;
pub mod reassembly;
pub mod reconnect;
pub mod session;
pub mod transport;

pub use config::{ReconnectConfig, SessionConfig};
pub use coordinator::{ChannelEvent, ChannelKind, DualChannelCoordinator};
pub use error::SessionError;
pub use events::{ConnectionState, DeliveryStatus, SessionEvent};
pub use session::SessionHandle;
pub use transport::{ConnectError, Connector, TransportEvent, TransportHandle, WsConnector};

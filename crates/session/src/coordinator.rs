//! Dual-channel coordinator
//!
//! Pairs two fully independent connection sessions (the chat/command
//! channel and the shell/terminal channel) under one subscription API.
//! Each session keeps its own config, reconnection policy, and lifecycle;
//! a failure or reconnect on one channel never touches the other.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use codedeck_protocol::OutboundFrame;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{DeliveryStatus, SessionEvent};
use crate::session::SessionHandle;
use crate::transport::Connector;

const EVENT_BUFFER: usize = 256;

/// Which logical channel an event originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Command,
    Shell,
}

/// A session event tagged with its originating channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
    pub channel: ChannelKind,
    pub event: SessionEvent,
}

pub struct DualChannelCoordinator {
    command: SessionHandle,
    shell: SessionHandle,
    events: broadcast::Sender<ChannelEvent>,
}

impl DualChannelCoordinator {
    /// Spawn both sessions from their configs, sharing one connector type.
    pub fn spawn<C: Connector + Clone>(
        command_config: SessionConfig,
        shell_config: SessionConfig,
        connector: C,
    ) -> Self {
        let command = SessionHandle::spawn(command_config, connector.clone());
        let shell = SessionHandle::spawn(shell_config, connector);
        Self::from_handles(command, shell)
    }

    /// Wrap two already-running sessions. Useful when the channels need
    /// different connectors (tests do this).
    pub fn from_handles(command: SessionHandle, shell: SessionHandle) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        spawn_channel_forwarder(command.subscribe(), events.clone(), ChannelKind::Command);
        spawn_channel_forwarder(shell.subscribe(), events.clone(), ChannelKind::Shell);
        Self {
            command,
            shell,
            events,
        }
    }

    pub fn command(&self) -> &SessionHandle {
        &self.command
    }

    pub fn shell(&self) -> &SessionHandle {
        &self.shell
    }

    /// Subscribe to events from both channels, each tagged with its origin.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Propagate a terminal window resize to the shell channel.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<DeliveryStatus, SessionError> {
        self.shell
            .send(OutboundFrame::ShellResize { cols, rows })
            .await
    }

    /// Close both channels cleanly.
    pub async fn close_all(&self) {
        tokio::join!(self.command.close(), self.shell.close());
    }
}

/// Drain one session's broadcast receiver into the unified channel,
/// tagging every event. Exits when the session's event channel closes.
fn spawn_channel_forwarder(
    mut rx: broadcast::Receiver<SessionEvent>,
    tx: broadcast::Sender<ChannelEvent>,
    channel: ChannelKind,
) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let _ = tx.send(ChannelEvent { channel, event });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "coordinator",
                        event = "coordinator.lagged",
                        ?channel,
                        skipped,
                        "Unified subscriber fell behind"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

//! Transport seam
//!
//! One capability set (connect → paired outgoing sink / incoming event
//! stream) with exactly one production implementation. The session actor
//! only ever talks to [`TransportHandle`], so tests drive the state machine
//! with in-process channels instead of sockets.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

/// Events surfaced by the transport to the owning session.
#[derive(Debug)]
pub enum TransportEvent {
    /// One text frame.
    Message(String),
    /// One binary frame; the codec validates UTF-8.
    Binary(Vec<u8>),
    /// The connection ended. `clean` is reserved for caller-initiated
    /// closure; a close originating on the remote side (close frame, EOF,
    /// protocol error) is reported as unclean so the session can decide
    /// whether to reconnect.
    Closed { clean: bool },
}

/// Live connection: a sender for outgoing wire text and a receiver for
/// incoming events. Dropping the handle tears the connection down.
#[derive(Debug)]
pub struct TransportHandle {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<TransportEvent>,
}

/// Handshake failures.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The backend rejected the credential. Non-retriable.
    #[error("authentication rejected during handshake")]
    Unauthorized,

    /// Anything else: refused, reset, DNS, timeout. Retriable.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Connection factory. The session owns reconnect policy and timers; a
/// connector performs exactly one handshake per call.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<TransportHandle, ConnectError>> + Send;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportHandle, ConnectError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(classify_handshake_error)?;

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(256);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!(component = "transport", error = %e, "Write failed");
                                let _ = event_tx.send(TransportEvent::Closed { clean: false }).await;
                                break;
                            }
                        }
                        // Session dropped its handle: caller-initiated close.
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    inbound = source.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if event_tx.send(TransportEvent::Message(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if event_tx.send(TransportEvent::Binary(bytes)).await.is_err() {
                                break;
                            }
                        }
                        // WebSocket-level ping/pong is answered by tungstenite.
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            debug!(component = "transport", ?frame, "Remote close");
                            let _ = event_tx.send(TransportEvent::Closed { clean: false }).await;
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(component = "transport", error = %e, "Read failed");
                            let _ = event_tx.send(TransportEvent::Closed { clean: false }).await;
                            break;
                        }
                        None => {
                            let _ = event_tx.send(TransportEvent::Closed { clean: false }).await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(TransportHandle {
            outgoing: out_tx,
            incoming: event_rx,
        })
    }
}

fn classify_handshake_error(err: tungstenite::Error) -> ConnectError {
    match err {
        tungstenite::Error::Http(response)
            if response.status() == 401 || response.status() == 403 =>
        {
            ConnectError::Unauthorized
        }
        other => ConnectError::Transport(other.to_string()),
    }
}

//! Connection session actor: owns one physical connection and its state
//! machine, processing all mutation sequentially.
//!
//! External callers hold a [`SessionHandle`] and communicate over an mpsc
//! channel; events fan out through a typed broadcast channel. Lock-free
//! state reads go through `ArcSwap`. The actor is the only authority on
//! retriability: transport send failures and per-frame decode errors are
//! reported but never trigger a reconnect by themselves; only transport
//! closure does.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwap;
use codedeck_protocol::{decode_bytes, decode_text, Decoded, InboundFrame, OutboundFrame};
use codedeck_term::SgrAttributes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{ConnectionState, DeliveryStatus, SessionEvent};
use crate::queue::OutboundQueue;
use crate::reassembly::StreamReassembler;
use crate::reconnect::ReconnectPolicy;
use crate::transport::{ConnectError, Connector, TransportEvent, TransportHandle};

/// Reassembly key for content streamed before the backend assigns a
/// session id.
const PENDING_KEY: &str = "pending";

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

type ConnectFuture = Pin<Box<dyn Future<Output = Result<TransportHandle, ConnectError>> + Send>>;
type ConnectReply = oneshot::Sender<Result<(), SessionError>>;

enum Command {
    Connect {
        reply: ConnectReply,
    },
    Send {
        frame: OutboundFrame,
        reply: oneshot::Sender<Result<DeliveryStatus, SessionError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running connection session (cheap to Clone).
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    state: Arc<ArcSwap<ConnectionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Spawn the session actor. The connection stays down until
    /// [`SessionHandle::connect`] is called.
    pub fn spawn<C: Connector>(config: SessionConfig, connector: C) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = Arc::new(ArcSwap::from_pointee(ConnectionState::Disconnected));

        let actor = SessionActor {
            policy: ReconnectPolicy::new(config.reconnect),
            queue: OutboundQueue::new(config.queue_capacity),
            reassembler: StreamReassembler::new(),
            connector: Arc::new(connector),
            state: Arc::clone(&state),
            events: events.clone(),
            config,
            link: None,
            handshake: None,
            reconnect_timer: None,
            pending_connect: None,
            active_session_id: None,
            sgr_state: SgrAttributes::default(),
        };
        tokio::spawn(actor.run(command_rx));

        SessionHandle {
            command_tx,
            state,
            events,
        }
    }

    /// Current connection state, lock-free.
    pub fn state(&self) -> ConnectionState {
        **self.state.load()
    }

    /// Subscribe to session events. Receivers clean up automatically when
    /// dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Open the connection. Does not block other callers; resolves when the
    /// session reaches `connected` or fails terminally. Automatic retries
    /// keep the call pending.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Connect { reply: tx })
            .await
            .map_err(|_| SessionError::ActorGone)?;
        rx.await.map_err(|_| SessionError::ActorGone)?
    }

    /// Submit an outbound frame. While connected it is transmitted
    /// immediately; while a connection is being (re)established it is
    /// queued; in a dead state the caller gets a delivery error.
    pub async fn send(&self, frame: OutboundFrame) -> Result<DeliveryStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send { frame, reply: tx })
            .await
            .map_err(|_| SessionError::ActorGone)?;
        rx.await.map_err(|_| SessionError::ActorGone)?
    }

    /// Ask the backend to abort an in-flight session.
    pub async fn abort(
        &self,
        session_id: impl Into<String>,
    ) -> Result<DeliveryStatus, SessionError> {
        self.send(OutboundFrame::AbortSession {
            session_id: session_id.into(),
        })
        .await
    }

    /// Close the connection cleanly: cancels any pending reconnect and
    /// never consults the reconnection policy.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Close { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

enum Wakeup {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Handshake(Result<TransportHandle, ConnectError>),
    Retry,
}

/// Await the next thing the actor must react to. Split out so the optional
/// sources borrow disjoint fields.
async fn next_wakeup(
    command_rx: &mut mpsc::Receiver<Command>,
    link: Option<&mut TransportHandle>,
    handshake: Option<&mut ConnectFuture>,
    timer: Option<&mut Pin<Box<Sleep>>>,
) -> Wakeup {
    let has_link = link.is_some();
    let has_handshake = handshake.is_some();
    let has_timer = timer.is_some();

    tokio::select! {
        cmd = command_rx.recv() => Wakeup::Command(cmd),
        event = async { link.unwrap().incoming.recv().await }, if has_link => {
            Wakeup::Transport(event)
        }
        result = async { handshake.unwrap().as_mut().await }, if has_handshake => {
            Wakeup::Handshake(result)
        }
        _ = async { timer.unwrap().as_mut().await }, if has_timer => Wakeup::Retry,
    }
}

struct SessionActor<C: Connector> {
    config: SessionConfig,
    connector: Arc<C>,
    state: Arc<ArcSwap<ConnectionState>>,
    events: broadcast::Sender<SessionEvent>,
    policy: ReconnectPolicy,
    queue: OutboundQueue,
    reassembler: StreamReassembler,
    link: Option<TransportHandle>,
    handshake: Option<ConnectFuture>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    pending_connect: Option<ConnectReply>,
    active_session_id: Option<String>,
    sgr_state: SgrAttributes,
}

impl<C: Connector> SessionActor<C> {
    async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        loop {
            let wakeup = next_wakeup(
                &mut command_rx,
                self.link.as_mut(),
                self.handshake.as_mut(),
                self.reconnect_timer.as_mut(),
            )
            .await;

            match wakeup {
                // All handles dropped: tear down and exit.
                Wakeup::Command(None) => {
                    self.link = None;
                    self.handshake = None;
                    self.reconnect_timer = None;
                    break;
                }
                Wakeup::Command(Some(cmd)) => self.handle_command(cmd).await,
                Wakeup::Transport(event) => {
                    let event = event.unwrap_or(TransportEvent::Closed { clean: false });
                    self.handle_transport(event).await;
                }
                Wakeup::Handshake(result) => {
                    self.handshake = None;
                    self.handle_handshake(result).await;
                }
                Wakeup::Retry => {
                    self.reconnect_timer = None;
                    info!(
                        component = "session",
                        event = "session.retry",
                        attempt = self.policy.attempts(),
                        "Reconnect timer fired"
                    );
                    self.begin_connect();
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => {
                let state = self.current_state();
                if state == ConnectionState::Reconnecting {
                    // Manual retry supersedes the scheduled one.
                    self.reconnect_timer = None;
                    self.pending_connect = Some(reply);
                    self.begin_connect();
                } else if state.can_connect() {
                    self.pending_connect = Some(reply);
                    self.begin_connect();
                } else {
                    let _ = reply.send(Err(SessionError::InvalidState(state)));
                }
            }
            Command::Send { frame, reply } => {
                let result = self.dispatch_send(frame).await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                self.reconnect_timer = None;
                self.handshake = None;
                self.link = None;
                if let Some(pending) = self.pending_connect.take() {
                    let _ = pending.send(Err(SessionError::Closed));
                }
                if !matches!(
                    self.current_state(),
                    ConnectionState::Disconnected | ConnectionState::Failed
                ) {
                    self.set_state(ConnectionState::Disconnected);
                }
                let _ = reply.send(());
            }
        }
    }

    fn begin_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let url = self.config.connect_url();
        self.handshake = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn handle_handshake(&mut self, result: Result<TransportHandle, ConnectError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.policy.on_connect_success();
                self.set_state(ConnectionState::Connected);
                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Ok(()));
                }
                self.drain_queue().await;
            }
            Err(ConnectError::Unauthorized) => {
                warn!(
                    component = "session",
                    event = "session.auth_rejected",
                    "Handshake rejected, not retrying"
                );
                self.set_state(ConnectionState::Failed);
                self.emit(SessionEvent::ErrorOccurred {
                    message: "authentication rejected by backend".to_string(),
                });
                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Err(SessionError::Unauthorized));
                }
            }
            Err(ConnectError::Transport(reason)) => {
                warn!(
                    component = "session",
                    event = "session.handshake_failed",
                    reason = %reason,
                    "Handshake failed"
                );
                self.schedule_reconnect(&reason);
            }
        }
    }

    async fn dispatch_send(
        &mut self,
        frame: OutboundFrame,
    ) -> Result<DeliveryStatus, SessionError> {
        let message_id = frame.message_id().map(str::to_string);
        let outcome = match self.current_state() {
            ConnectionState::Connected => {
                self.transmit(frame).await.map(|()| DeliveryStatus::Sent)
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => self
                .queue
                .enqueue(frame)
                .map(|()| DeliveryStatus::Queued),
            ConnectionState::Disconnected | ConnectionState::Failed => {
                Err(SessionError::NotConnected)
            }
        };

        if let Some(message_id) = message_id {
            let status = match &outcome {
                Ok(status) => *status,
                Err(_) => DeliveryStatus::Failed,
            };
            self.emit(SessionEvent::MessageStatusChanged { message_id, status });
        }
        outcome
    }

    async fn transmit(&mut self, frame: OutboundFrame) -> Result<(), SessionError> {
        let text = frame.encode()?;
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.outgoing
            .send(text)
            .await
            .map_err(|_| SessionError::Transport("connection write channel closed".to_string()))
    }

    /// Flush everything queued while disconnected, in FIFO order.
    async fn drain_queue(&mut self) {
        let frames = self.queue.drain();
        if frames.is_empty() {
            return;
        }
        info!(
            component = "session",
            event = "session.queue_drain",
            count = frames.len(),
            "Flushing queued messages"
        );
        for frame in frames {
            let message_id = frame.message_id().map(str::to_string);
            match self.transmit(frame).await {
                Ok(()) => {
                    if let Some(message_id) = message_id {
                        self.emit(SessionEvent::MessageStatusChanged {
                            message_id,
                            status: DeliveryStatus::Sent,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        component = "session",
                        event = "session.queue_drain_failed",
                        error = %e,
                        "Dropping queued message"
                    );
                    if let Some(message_id) = message_id {
                        self.emit(SessionEvent::MessageStatusChanged {
                            message_id,
                            status: DeliveryStatus::Failed,
                        });
                    }
                }
            }
        }
    }

    fn schedule_reconnect(&mut self, reason: &str) {
        match self.policy.on_unexpected_disconnect() {
            Some(delay) => {
                self.set_state(ConnectionState::Reconnecting);
                warn!(
                    component = "session",
                    event = "session.reconnect_scheduled",
                    attempt = self.policy.attempts(),
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Scheduling reconnect"
                );
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            None => {
                let attempts = self.config.reconnect.max_attempts;
                warn!(
                    component = "session",
                    event = "session.reconnect_exhausted",
                    attempts,
                    "Giving up"
                );
                self.set_state(ConnectionState::Failed);
                self.emit(SessionEvent::ReconnectExhausted { attempts });
                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Err(SessionError::ReconnectExhausted { attempts }));
                }
            }
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => {
                let decoded = decode_text(&text);
                self.route(decoded).await;
            }
            TransportEvent::Binary(bytes) => match decode_bytes(&bytes) {
                Ok(decoded) => self.route(decoded).await,
                // Local to one frame; connection state is untouched.
                Err(e) => {
                    warn!(
                        component = "session",
                        event = "session.decode_failed",
                        error = %e,
                        "Dropping undecodable frame"
                    );
                    self.emit(SessionEvent::ErrorOccurred {
                        message: format!("undecodable frame: {e}"),
                    });
                }
            },
            TransportEvent::Closed { clean } => {
                self.link = None;
                if clean {
                    self.set_state(ConnectionState::Disconnected);
                } else {
                    self.schedule_reconnect("transport closed unexpectedly");
                }
            }
        }
    }

    async fn route(&mut self, decoded: Decoded) {
        match decoded {
            Decoded::Frame(frame) => self.on_frame(frame).await,
            Decoded::Passthrough(content) => {
                let key = self.content_key();
                self.reassembler.append(&key, &content);
            }
            Decoded::Unknown(value) => {
                debug!(
                    component = "session",
                    event = "session.frame_ignored",
                    frame = %value,
                    "Ignoring unrecognized frame"
                );
            }
        }
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::ClaudeOutput { content }
            | InboundFrame::ClaudeResponse { content } => {
                let key = self.content_key();
                self.reassembler.append(&key, &content);
            }
            InboundFrame::ClaudeComplete { .. } => {
                let key = self.content_key();
                if let Some(content) = self.reassembler.finalize(&key) {
                    self.emit(SessionEvent::MessageReceived { key, content });
                }
            }
            InboundFrame::ToolUse { payload } => {
                self.emit(SessionEvent::ToolUse { payload });
            }
            InboundFrame::SessionCreated { session_id } => {
                // Content streamed before the id arrived belongs to this
                // session; move it under the real key.
                self.reassembler.rekey(PENDING_KEY, &session_id);
                self.active_session_id = Some(session_id.clone());
                self.emit(SessionEvent::SessionCreated { session_id });
            }
            InboundFrame::SessionAborted { session_id } => {
                let key = session_id
                    .clone()
                    .or_else(|| self.active_session_id.clone())
                    .unwrap_or_else(|| PENDING_KEY.to_string());
                self.reassembler.reset(&key);
                self.emit(SessionEvent::SessionAborted { session_id });
            }
            InboundFrame::Error { error } => {
                self.emit(SessionEvent::ErrorOccurred { message: error });
            }
            InboundFrame::Ping => {
                if let Err(e) = self.transmit(OutboundFrame::Pong).await {
                    warn!(
                        component = "session",
                        event = "session.pong_failed",
                        error = %e,
                        "Could not answer ping"
                    );
                }
            }
            InboundFrame::Pong => {}
            InboundFrame::ShellInit { session_id } => {
                self.emit(SessionEvent::ShellStarted { session_id });
            }
            InboundFrame::ShellOutput { data } => {
                let spans =
                    codedeck_term::decode_with(&data, &self.config.theme, &mut self.sgr_state);
                self.emit(SessionEvent::ShellOutput { data, spans });
            }
            InboundFrame::ShellExit { code } => {
                self.emit(SessionEvent::ShellExit { code });
            }
            InboundFrame::ShellClear => {
                self.sgr_state = SgrAttributes::default();
                self.emit(SessionEvent::ShellClear);
            }
        }
    }

    fn content_key(&self) -> String {
        self.active_session_id
            .clone()
            .unwrap_or_else(|| PENDING_KEY.to_string())
    }

    fn current_state(&self) -> ConnectionState {
        **self.state.load()
    }

    fn set_state(&mut self, next: ConnectionState) {
        let prev = self.current_state();
        if prev == next {
            return;
        }
        self.state.store(Arc::new(next));
        info!(
            component = "session",
            event = "session.state",
            from = %prev,
            to = %next,
            attempt = self.policy.attempts(),
            "Connection state changed"
        );
        self.emit(SessionEvent::ConnectionStateChanged {
            state: next,
            attempt: self.policy.attempts(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; events are push-only.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::Value;

    enum Outcome {
        Accept,
        /// Accept only after the gate fires, to hold the session in
        /// `connecting`.
        AcceptGated(oneshot::Receiver<()>),
        Refuse,
        RefuseAuth,
    }

    struct MockLink {
        events: mpsc::Sender<TransportEvent>,
        sent: mpsc::Receiver<String>,
    }

    #[derive(Clone)]
    struct MockConnector {
        outcomes: Arc<Mutex<VecDeque<Outcome>>>,
        links: mpsc::UnboundedSender<MockLink>,
        attempts: Arc<AtomicU32>,
    }

    fn mock(outcomes: Vec<Outcome>) -> (MockConnector, mpsc::UnboundedReceiver<MockLink>) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            links: links_tx,
            attempts: Arc::new(AtomicU32::new(0)),
        };
        (connector, links_rx)
    }

    impl MockConnector {
        fn accept(&self) -> Result<TransportHandle, ConnectError> {
            let (out_tx, out_rx) = mpsc::channel(64);
            let (event_tx, event_rx) = mpsc::channel(64);
            let _ = self.links.send(MockLink {
                events: event_tx,
                sent: out_rx,
            });
            Ok(TransportHandle {
                outgoing: out_tx,
                incoming: event_rx,
            })
        }
    }

    impl Connector for MockConnector {
        async fn connect(&self, _url: &str) -> Result<TransportHandle, ConnectError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcomes.lock().unwrap().pop_front();
            match outcome {
                Some(Outcome::Accept) => self.accept(),
                Some(Outcome::AcceptGated(gate)) => {
                    let _ = gate.await;
                    self.accept()
                }
                Some(Outcome::RefuseAuth) => Err(ConnectError::Unauthorized),
                Some(Outcome::Refuse) | None => {
                    Err(ConnectError::Transport("connection refused".to_string()))
                }
            }
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new("ws://test/ws").with_token("tok123")
    }

    fn command(id: &str) -> OutboundFrame {
        OutboundFrame::ClaudeCommand {
            content: format!("content-{id}"),
            project_path: "/p".to_string(),
            session_id: None,
            message_id: id.to_string(),
        }
    }

    fn frame_json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    async fn inject(link: &MockLink, text: &str) {
        link.events
            .send(TransportEvent::Message(text.to_string()))
            .await
            .unwrap();
    }

    // Generous bound: in paused-time tests the reconnect timers (up to 10s
    // of virtual time) must fire before this timeout does.
    async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn connect_reaches_connected_and_resets_nothing_queued() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);

        handle.connect().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(links.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_in_dead_state_is_a_delivery_error() {
        let (connector, _links) = mock(vec![]);
        let handle = SessionHandle::spawn(config(), connector);

        let err = handle.send(command("m1")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn commands_queued_while_connecting_drain_in_fifo_order() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (connector, mut links) = mock(vec![Outcome::AcceptGated(gate_rx)]);
        let handle = SessionHandle::spawn(config(), connector);

        let connect_task = tokio::spawn({
            let handle = handle.clone();
            async move { handle.connect().await }
        });

        // The handshake is gated, so the session sits in `connecting`.
        while handle.state() != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }

        for id in ["a", "b", "c"] {
            let status = handle.send(command(id)).await.unwrap();
            assert_eq!(status, DeliveryStatus::Queued);
        }

        gate_tx.send(()).unwrap();
        connect_task.await.unwrap().unwrap();

        let mut link = links.recv().await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let text = tokio::time::timeout(Duration::from_secs(60), link.sent.recv())
                .await
                .unwrap()
                .unwrap();
            ids.push(frame_json(&text)["messageId"].as_str().unwrap().to_string());
        }
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn queue_rejects_beyond_capacity() {
        let (gate_tx, gate_rx) = oneshot::channel();
        let (connector, _links) = mock(vec![Outcome::AcceptGated(gate_rx)]);
        let mut cfg = config();
        cfg.queue_capacity = 2;
        let handle = SessionHandle::spawn(cfg, connector);

        let connect_task = tokio::spawn({
            let handle = handle.clone();
            async move { handle.connect().await }
        });
        while handle.state() != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }

        handle.send(command("a")).await.unwrap();
        handle.send(command("b")).await.unwrap();
        let err = handle.send(command("c")).await.unwrap_err();
        assert!(matches!(err, SessionError::QueueFull(2)));

        gate_tx.send(()).unwrap();
        connect_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn streamed_fragments_reassemble_exactly_once() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();

        inject(&link, r#"{"type":"session-created","sessionId":"s1"}"#).await;
        inject(&link, r#"{"type":"claude-output","content":"Hel"}"#).await;
        inject(&link, r#"{"type":"claude-output","content":"lo"}"#).await;
        inject(&link, r#"{"type":"claude-complete"}"#).await;
        // A duplicate completion signal must not produce a second message.
        inject(&link, r#"{"type":"claude-complete"}"#).await;
        inject(&link, r#"{"type":"error","error":"sentinel"}"#).await;

        let mut received = Vec::new();
        loop {
            match next_event(&mut events).await {
                SessionEvent::MessageReceived { key, content } => {
                    received.push((key, content));
                }
                SessionEvent::ErrorOccurred { message } if message == "sentinel" => break,
                _ => {}
            }
        }
        assert_eq!(received, [("s1".to_string(), "Hello".to_string())]);
    }

    #[tokio::test]
    async fn raw_passthrough_joins_the_active_stream() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();

        // Fragments streamed before the session id arrives are re-keyed.
        inject(&link, "anonymous ").await;
        inject(&link, r#"{"type":"session-created","sessionId":"s2"}"#).await;
        inject(&link, r#"{"data":"typeless "}"#).await;
        inject(&link, r#"{"type":"claude-output","content":"typed"}"#).await;
        inject(&link, r#"{"type":"claude-complete"}"#).await;

        loop {
            if let SessionEvent::MessageReceived { key, content } = next_event(&mut events).await {
                assert_eq!(key, "s2");
                assert_eq!(content, "anonymous typeless typed");
                break;
            }
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);

        handle.connect().await.unwrap();
        let mut link = links.recv().await.unwrap();

        inject(&link, r#"{"type":"ping"}"#).await;
        let text = tokio::time::timeout(Duration::from_secs(60), link.sent.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame_json(&text), serde_json::json!({"type": "pong"}));
    }

    #[tokio::test(start_paused = true)]
    async fn unclean_close_retries_with_backoff_then_fails() {
        let (connector, mut links) = mock(vec![
            Outcome::Accept,
            Outcome::Refuse,
            Outcome::Refuse,
            Outcome::Refuse,
            Outcome::Refuse,
            Outcome::Refuse,
        ]);
        let handle = SessionHandle::spawn(config(), connector.clone());
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();

        let started = tokio::time::Instant::now();
        link.events
            .send(TransportEvent::Closed { clean: false })
            .await
            .unwrap();

        let mut exhausted = 0;
        let mut saw_reconnecting = false;
        loop {
            match next_event(&mut events).await {
                SessionEvent::ConnectionStateChanged {
                    state: ConnectionState::Reconnecting,
                    ..
                } => saw_reconnecting = true,
                SessionEvent::ReconnectExhausted { attempts } => {
                    exhausted += 1;
                    assert_eq!(attempts, 5);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_reconnecting);
        assert_eq!(exhausted, 1);
        assert_eq!(handle.state(), ConnectionState::Failed);
        // 2+4+6+8+10 seconds of linear backoff before giving up.
        assert!(started.elapsed() >= Duration::from_secs(30));
        // Initial connect plus five retries.
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 6);

        let err = handle.send(command("late")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_a_pending_reconnect() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector.clone());
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();
        link.events
            .send(TransportEvent::Closed { clean: false })
            .await
            .unwrap();

        loop {
            if let SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Reconnecting,
                ..
            } = next_event(&mut events).await
            {
                break;
            }
        }

        handle.close().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_close_never_consults_the_policy() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector.clone());
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();
        link.events
            .send(TransportEvent::Closed { clean: true })
            .await
            .unwrap();

        loop {
            if let SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Disconnected,
                ..
            } = next_event(&mut events).await
            {
                break;
            }
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auth_rejection_fails_without_retry() {
        let (connector, _links) = mock(vec![Outcome::RefuseAuth]);
        let handle = SessionHandle::spawn(config(), connector.clone());

        let err = handle.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthorized));
        assert_eq!(handle.state(), ConnectionState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_while_connected_is_invalid() {
        let (connector, _links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);

        handle.connect().await.unwrap();
        let err = handle.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState(ConnectionState::Connected)
        ));
    }

    #[tokio::test]
    async fn manual_connect_allowed_again_after_failure() {
        let (connector, mut links) = mock(vec![Outcome::RefuseAuth, Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);

        assert!(handle.connect().await.is_err());
        assert_eq!(handle.state(), ConnectionState::Failed);

        handle.connect().await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(links.recv().await.is_some());
    }

    #[tokio::test]
    async fn transmit_failure_reports_but_keeps_state() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();
        // Dropping the read side makes every write fail.
        drop(link.sent);

        let err = handle.send(command("m1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn shell_output_carries_sgr_state_across_chunks() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let link = links.recv().await.unwrap();

        inject(&link, r#"{"type":"output","data":"\u001b[32mgre"}"#).await;
        inject(&link, r#"{"type":"output","data":"en"}"#).await;
        inject(&link, r#"{"type":"clear"}"#).await;
        inject(&link, r#"{"type":"output","data":"plain"}"#).await;

        let mut outputs = Vec::new();
        loop {
            match next_event(&mut events).await {
                SessionEvent::ShellOutput { spans, .. } => {
                    outputs.push(spans);
                    if outputs.len() == 3 {
                        break;
                    }
                }
                _ => {}
            }
        }

        let green = codedeck_term::Rgba::opaque(0, 205, 0);
        assert_eq!(outputs[0][0].foreground, green);
        // Color opened in the first chunk survives into the second.
        assert_eq!(outputs[1][0].foreground, green);
        // And `clear` resets the carried state.
        assert_eq!(
            outputs[2][0].foreground,
            codedeck_term::Theme::default().foreground
        );
    }

    #[tokio::test]
    async fn delivery_status_events_follow_the_message_id() {
        let (connector, mut links) = mock(vec![Outcome::Accept]);
        let handle = SessionHandle::spawn(config(), connector);
        let mut events = handle.subscribe();

        handle.connect().await.unwrap();
        let _link = links.recv().await.unwrap();

        handle.send(command("m1")).await.unwrap();
        loop {
            if let SessionEvent::MessageStatusChanged { message_id, status } =
                next_event(&mut events).await
            {
                assert_eq!(message_id, "m1");
                assert_eq!(status, DeliveryStatus::Sent);
                break;
            }
        }
    }
}

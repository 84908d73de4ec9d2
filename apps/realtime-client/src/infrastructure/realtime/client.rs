//! Realtime Client
//!
//! Owns the single logical connection to the message server.
//!
//! # Lifecycle
//!
//! `connect()` returns immediately. A spawned connection task reads the auth
//! token, opens a transport and then drives it until it closes:
//!
//! 1. `Open`: phase becomes `Open`, the attempt counter resets, a heartbeat
//!    starts and `connection` is emitted
//! 2. `Message`: the frame is decoded and its `data` dispatched to every
//!    handler registered for its `type`; malformed frames are dropped
//! 3. `Close`: the heartbeat stops, `disconnection` is emitted and, unless
//!    the close was clean (1000) or requested by `disconnect()`, a reconnect
//!    is scheduled with capped exponential backoff
//!
//! Every attempt carries a generation number. Events from a superseded
//! attempt are ignored, so at most one transport, one heartbeat and one
//! pending reconnect timer are ever live.
//!
//! No failure is returned to the caller: connect failures, transport errors
//! and exhausted retries surface as `error`, `reconnecting` and
//! `max_reconnect_attempts` events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use super::auth::{self, AuthToken};
use super::codec::{CodecError, EnvelopeCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager};
use super::messages::{MessageKind, OutboundMessage, decode_payload};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::transport::TungsteniteConnector;
use crate::RealtimeSettings;
use crate::application::ports::{
    TokenError, TokenProvider, Transport, TransportConnector, TransportError, TransportEvent,
    TransportEvents,
};
use crate::domain::connection::{
    ABNORMAL_CLOSURE, ConnectionPhase, NORMAL_CLOSURE, is_abnormal_close,
};
use crate::domain::envelope::{Envelope, events};
use crate::domain::registry::{SubscriberRegistry, SubscriptionId};
use crate::infrastructure::metrics::{self, DropReason};

/// Buffered heartbeat ticks per connection.
const HEARTBEAT_CHANNEL_CAPACITY: usize = 4;

// =============================================================================
// Error Type
// =============================================================================

/// Why a connection attempt failed before a transport existed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// No auth token is stored.
    #[error("no auth token available")]
    MissingToken,

    /// Token storage could not be read.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The transport could not be constructed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the realtime client.
#[derive(Debug, Clone)]
pub struct RealtimeClientConfig {
    /// WebSocket endpoint, without the token query parameter.
    pub url: String,
    /// User id stamped on outbound envelopes.
    pub user_id: Option<String>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl RealtimeClientConfig {
    /// Create a configuration with default reconnect and heartbeat behavior.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Create configuration from `RealtimeSettings`.
    #[must_use]
    pub fn from_settings(settings: &RealtimeSettings) -> Self {
        Self {
            url: settings.ws_url.clone(),
            user_id: settings.user_id.clone(),
            reconnect: ReconnectConfig::from_settings(settings),
            heartbeat: HeartbeatConfig::from_settings(settings),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

struct ConnectionState {
    phase: ConnectionPhase,
    generation: u64,
    transport: Option<Arc<dyn Transport>>,
    reconnect: ReconnectPolicy,
    heartbeat_cancel: Option<CancellationToken>,
    reconnect_cancel: Option<CancellationToken>,
}

impl ConnectionState {
    fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            generation: 0,
            transport: None,
            reconnect: ReconnectPolicy::new(reconnect),
            heartbeat_cancel: None,
            reconnect_cancel: None,
        }
    }

    fn begin_attempt(&mut self) -> u64 {
        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;
        self.generation
    }

    fn stop_heartbeat(&mut self) {
        if let Some(cancel) = self.heartbeat_cancel.take() {
            cancel.cancel();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(cancel) = self.reconnect_cancel.take() {
            cancel.cancel();
        }
    }
}

enum CloseOutcome {
    Disconnected,
    Closed,
    Reconnect,
}

enum Scheduled {
    Retry { attempt: u32, delay_ms: u64 },
    Exhausted { attempts: u32 },
}

// =============================================================================
// Client
// =============================================================================

/// Reconnecting realtime client.
///
/// Cheap to clone; clones share the connection and the subscriber registry.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use marketplace_realtime::infrastructure::realtime::auth::StaticTokenProvider;
/// use marketplace_realtime::infrastructure::realtime::client::{RealtimeClient, RealtimeClientConfig};
/// use marketplace_realtime::domain::envelope::events;
///
/// # async fn example() {
/// let client = RealtimeClient::with_tungstenite(
///     RealtimeClientConfig::new("ws://localhost:8000/ws"),
///     Arc::new(StaticTokenProvider::new("token")),
/// );
///
/// let sender = client.clone();
/// client.on(events::CONNECTION, move |_| sender.join_conversation("c-1"));
/// client.on("new_message", |data| println!("{data}"));
///
/// client.connect();
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: RealtimeClientConfig,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn TransportConnector>,
    codec: EnvelopeCodec,
    registry: SubscriberRegistry,
    connection: Mutex<ConnectionState>,
}

impl RealtimeClient {
    /// Create a client with injected token storage and socket factory.
    #[must_use]
    pub fn new(
        config: RealtimeClientConfig,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let connection = Mutex::new(ConnectionState::new(config.reconnect.clone()));
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                connector,
                codec: EnvelopeCodec::new(),
                registry: SubscriberRegistry::new(),
                connection,
            }),
        }
    }

    /// Create a client backed by `tokio-tungstenite` sockets.
    #[must_use]
    pub fn with_tungstenite(config: RealtimeClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::new(config, tokens, Arc::new(TungsteniteConnector::new()))
    }

    /// Create a `tokio-tungstenite` client from `RealtimeSettings`.
    #[must_use]
    pub fn from_settings(settings: &RealtimeSettings, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_tungstenite(RealtimeClientConfig::from_settings(settings), tokens)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start connecting. No-op while connecting or open.
    ///
    /// Cancels a pending reconnect timer and connects immediately. After
    /// `max_reconnect_attempts` the attempt counter starts over.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the connection cleanly and stop all background work.
    ///
    /// Stops the heartbeat, cancels any pending reconnect, resets the attempt
    /// counter and closes the transport with code 1000. Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Disconnect and wait up to `timeout` for the close handshake.
    ///
    /// Returns `false` if the transport had not reported its close in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let closed = Arc::new(Notify::new());
        let signal = Arc::clone(&closed);
        let id = self.on(events::DISCONNECTION, move |_| signal.notify_one());

        self.disconnect();

        let done = self.state() != ConnectionPhase::Closing
            || tokio::time::timeout(timeout, closed.notified()).await.is_ok();

        self.off(events::DISCONNECTION, Some(id));
        done
    }

    /// Whether the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.open_transport().is_some()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> ConnectionPhase {
        self.inner.connection.lock().phase
    }

    /// Reconnect attempts scheduled since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.connection.lock().reconnect.attempt_count()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a handler for `event`. Handlers run in registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(event, Arc::new(handler))
    }

    /// Register a handler receiving `data` decoded as `T`.
    ///
    /// Payloads that do not match `T` are logged and skipped.
    pub fn on_payload<T, F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event_type = event.to_string();
        self.on(event, move |data| {
            match decode_payload::<T>(&event_type, data) {
                Ok(payload) => handler(payload),
                Err(e) => {
                    tracing::warn!(event_type = %event_type, error = %e, "Payload did not match handler type");
                }
            }
        })
    }

    /// Remove one registration, or every handler for `event` when `id` is `None`.
    ///
    /// Returns the number of handlers removed.
    pub fn off(&self, event: &str, id: Option<SubscriptionId>) -> usize {
        self.inner.registry.unsubscribe(event, id)
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.registry.subscriber_count(event)
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send an envelope of `event_type` carrying `data`.
    ///
    /// Silently dropped (logged at debug) unless the transport is open.
    pub fn send<T: Serialize + ?Sized>(&self, event_type: &str, data: &T) {
        self.inner.send(event_type, data);
    }

    /// Send a typed outbound message.
    pub fn send_message(&self, message: &OutboundMessage) {
        self.inner.send(message.event_type(), &message.data());
    }

    /// Join a conversation room.
    pub fn join_conversation(&self, conversation_id: &str) {
        self.send_message(&OutboundMessage::JoinConversation {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Leave a conversation room.
    pub fn leave_conversation(&self, conversation_id: &str) {
        self.send_message(&OutboundMessage::LeaveConversation {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Send a `typing` indicator with an explicit flag.
    pub fn send_typing(&self, conversation_id: &str, is_typing: bool) {
        self.send_message(&OutboundMessage::Typing {
            conversation_id: conversation_id.to_string(),
            is_typing,
        });
    }

    /// Send `typing_start`.
    pub fn start_typing(&self, conversation_id: &str) {
        self.send_message(&OutboundMessage::TypingStart {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Send `typing_stop`.
    pub fn stop_typing(&self, conversation_id: &str) {
        self.send_message(&OutboundMessage::TypingStop {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Send a chat message.
    pub fn send_chat_message(&self, conversation_id: &str, content: &str, kind: MessageKind) {
        self.send_message(&OutboundMessage::ChatMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            message_type: kind,
        });
    }

    /// Subscribe to status updates for one order.
    pub fn subscribe_order(&self, order_id: &str) {
        self.send_message(&OutboundMessage::SubscribeOrder {
            order_id: order_id.to_string(),
        });
    }

    /// Subscribe to price alert broadcasts.
    pub fn subscribe_price_alerts(&self) {
        self.send_message(&OutboundMessage::SubscribePriceAlerts);
    }

    /// Subscribe to dispute broadcasts.
    pub fn subscribe_disputes(&self) {
        self.send_message(&OutboundMessage::SubscribeDisputes);
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection = self.inner.connection.lock();
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.config.url)
            .field("phase", &connection.phase)
            .field("reconnect_attempts", &connection.reconnect.attempt_count())
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Driver
// =============================================================================

impl Inner {
    fn connect(self: &Arc<Self>) {
        let generation = {
            let mut conn = self.connection.lock();
            if conn.phase.is_active() {
                tracing::debug!(state = %conn.phase, "connect() ignored, connection already active");
                return;
            }
            conn.cancel_reconnect();
            if !conn.reconnect.should_retry() {
                conn.reconnect.reset();
            }
            conn.begin_attempt()
        };

        tracing::info!(url = %self.config.url, "Connecting to realtime server");
        self.spawn_connection(generation);
    }

    fn reconnect_due(self: &Arc<Self>, timer: &CancellationToken) {
        let (generation, attempt) = {
            let mut conn = self.connection.lock();
            if timer.is_cancelled() || conn.phase.is_active() {
                return;
            }
            conn.reconnect_cancel = None;
            (conn.begin_attempt(), conn.reconnect.attempt_count())
        };

        tracing::info!(attempt, "Reconnecting to realtime server");
        self.spawn_connection(generation);
    }

    fn spawn_connection(self: &Arc<Self>, generation: u64) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(Arc::clone(self).run_connection(generation));
            }
            Err(e) => {
                tracing::error!(error = %e, "connect() requires a tokio runtime");
                {
                    let mut conn = self.connection.lock();
                    if conn.generation == generation {
                        conn.phase = ConnectionPhase::Disconnected;
                    }
                }
                let error = TransportError::NoRuntime(e.to_string());
                self.emit(events::ERROR, &json!({ "message": error.to_string() }));
            }
        }
    }

    async fn run_connection(self: Arc<Self>, generation: u64) {
        let (transport, mut transport_events) = match self.open_transport_for(generation).await {
            Ok(Some(opened)) => opened,
            Ok(None) => return,
            Err(e) => {
                self.connect_failed(generation, &e);
                return;
            }
        };

        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel(HEARTBEAT_CHANNEL_CAPACITY);

        loop {
            tokio::select! {
                event = transport_events.recv() => match event {
                    Some(TransportEvent::Open) => self.handle_open(generation, &heartbeat_tx),
                    Some(TransportEvent::Message(text)) => {
                        if self.is_current(generation) {
                            self.handle_message(&text);
                        }
                    }
                    Some(TransportEvent::Error(message)) => {
                        self.handle_transport_error(generation, &message);
                    }
                    Some(TransportEvent::Close { code, reason }) => {
                        self.handle_close(generation, code, &reason);
                        break;
                    }
                    None => {
                        self.handle_close(generation, ABNORMAL_CLOSURE, "transport stopped");
                        break;
                    }
                },
                Some(tick) = heartbeat_rx.recv() => self.handle_heartbeat(generation, tick),
            }
        }

        drop(transport);
    }

    async fn open_transport_for(
        &self,
        generation: u64,
    ) -> Result<Option<(Arc<dyn Transport>, TransportEvents)>, ConnectError> {
        let token = self
            .tokens
            .token()
            .await?
            .and_then(AuthToken::new)
            .ok_or(ConnectError::MissingToken)?;

        if !self.is_connecting(generation) {
            return Ok(None);
        }

        let url = auth::connection_url(&self.config.url, &token);
        let (transport, transport_events) = self.connector.connect(&url)?;

        {
            let mut conn = self.connection.lock();
            if conn.generation == generation && conn.phase == ConnectionPhase::Connecting {
                conn.transport = Some(Arc::clone(&transport));
                return Ok(Some((transport, transport_events)));
            }
        }

        tracing::debug!("Connection attempt superseded, closing transport");
        transport.close(NORMAL_CLOSURE, "superseded");
        Ok(None)
    }

    fn connect_failed(self: &Arc<Self>, generation: u64, error: &ConnectError) {
        if !self.is_current(generation) {
            return;
        }

        tracing::warn!(error = %error, "Realtime connection attempt failed");
        self.emit(events::ERROR, &json!({ "message": error.to_string() }));
        self.schedule_reconnect(generation);
    }

    fn handle_open(&self, generation: u64, heartbeat_tx: &mpsc::Sender<HeartbeatEvent>) {
        {
            let mut conn = self.connection.lock();
            if conn.generation != generation || conn.phase != ConnectionPhase::Connecting {
                return;
            }
            conn.phase = ConnectionPhase::Open;
            conn.reconnect.reset();
            conn.stop_heartbeat();

            let cancel = CancellationToken::new();
            conn.heartbeat_cancel = Some(cancel.clone());
            tokio::spawn(
                HeartbeatManager::new(self.config.heartbeat.clone(), heartbeat_tx.clone(), cancel)
                    .run(),
            );
        }

        tracing::info!(url = %self.config.url, "Realtime connection open");
        metrics::set_connected(true);
        self.emit(events::CONNECTION, &Value::Null);
    }

    fn handle_message(&self, text: &str) {
        tracing::trace!(bytes = text.len(), "Inbound frame");

        match self.codec.decode(text) {
            Ok(envelope) => {
                metrics::record_message_received();
                self.emit(&envelope.event_type, &envelope.data);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                metrics::record_message_dropped(DropReason::Malformed);
            }
        }
    }

    fn handle_transport_error(&self, generation: u64, message: &str) {
        if !self.is_current(generation) {
            return;
        }

        tracing::warn!(error = %message, "Realtime transport error");
        self.emit(events::ERROR, &json!({ "message": message }));
    }

    fn handle_heartbeat(&self, generation: u64, tick: HeartbeatEvent) {
        match tick {
            HeartbeatEvent::Tick => {
                if self.is_current(generation) {
                    tracing::trace!("Heartbeat tick");
                    self.send(events::PING, &json!({}));
                }
            }
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        let outcome = {
            let mut conn = self.connection.lock();
            if conn.generation != generation {
                return;
            }
            conn.stop_heartbeat();
            conn.transport = None;

            if conn.phase == ConnectionPhase::Closing {
                conn.phase = ConnectionPhase::Disconnected;
                CloseOutcome::Disconnected
            } else if is_abnormal_close(code) {
                CloseOutcome::Reconnect
            } else {
                conn.phase = ConnectionPhase::Closed;
                CloseOutcome::Closed
            }
        };

        metrics::set_connected(false);

        match outcome {
            CloseOutcome::Disconnected | CloseOutcome::Closed => {
                tracing::info!(code, reason = %reason, "Realtime connection closed");
            }
            CloseOutcome::Reconnect => {
                tracing::warn!(code, reason = %reason, "Realtime connection closed abnormally");
            }
        }

        self.emit(
            events::DISCONNECTION,
            &json!({ "code": code, "reason": reason }),
        );

        if matches!(outcome, CloseOutcome::Reconnect) {
            self.schedule_reconnect(generation);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let scheduled = {
            let mut conn = self.connection.lock();
            if conn.generation != generation {
                return;
            }
            conn.phase = ConnectionPhase::Disconnected;
            conn.cancel_reconnect();

            match conn.reconnect.next_delay() {
                Some(delay) => {
                    let timer = CancellationToken::new();
                    conn.reconnect_cancel = Some(timer.clone());

                    let inner = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::select! {
                            () = timer.cancelled() => {}
                            () = tokio::time::sleep(delay) => inner.reconnect_due(&timer),
                        }
                    });

                    Scheduled::Retry {
                        attempt: conn.reconnect.attempt_count(),
                        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    }
                }
                None => Scheduled::Exhausted {
                    attempts: conn.reconnect.attempt_count(),
                },
            }
        };

        match scheduled {
            Scheduled::Retry { attempt, delay_ms } => {
                tracing::info!(attempt, delay_ms, "Reconnect scheduled");
                metrics::record_reconnect();
                self.emit(
                    events::RECONNECTING,
                    &json!({ "attempt": attempt, "delay_ms": delay_ms }),
                );
            }
            Scheduled::Exhausted { attempts } => {
                tracing::warn!(attempts, "Maximum reconnect attempts reached, giving up");
                self.emit(
                    events::MAX_RECONNECT_ATTEMPTS,
                    &json!({ "attempts": attempts }),
                );
            }
        }
    }

    fn disconnect(&self) {
        let transport = {
            let mut conn = self.connection.lock();
            conn.cancel_reconnect();
            conn.stop_heartbeat();
            conn.reconnect.reset();

            match conn.transport.take() {
                Some(transport) => {
                    conn.phase = ConnectionPhase::Closing;
                    Some(transport)
                }
                None => {
                    if conn.phase != ConnectionPhase::Closing {
                        conn.phase = ConnectionPhase::Disconnected;
                        conn.generation += 1;
                    }
                    None
                }
            }
        };

        if let Some(transport) = transport {
            tracing::info!("Disconnecting from realtime server");
            transport.close(NORMAL_CLOSURE, "client disconnect");
            metrics::set_connected(false);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn send<T: Serialize + ?Sized>(&self, event_type: &str, data: &T) {
        let Some(transport) = self.open_transport() else {
            tracing::debug!(event_type, "Not connected, dropping outbound message");
            metrics::record_message_dropped(DropReason::NotConnected);
            return;
        };

        let encoded = serde_json::to_value(data)
            .map_err(CodecError::from)
            .and_then(|data| {
                let envelope = Envelope::outbound(event_type, data, self.config.user_id.clone());
                self.codec.encode(&envelope)
            });

        let text = match encoded {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(event_type, error = %e, "Failed to encode outbound message");
                metrics::record_message_dropped(DropReason::Encode);
                return;
            }
        };

        match transport.send_text(text) {
            Ok(()) => {
                tracing::trace!(event_type, "Outbound frame");
                metrics::record_message_sent(event_type);
            }
            Err(TransportError::NotOpen) => {
                tracing::debug!(event_type, "Transport closed, dropping outbound message");
                metrics::record_message_dropped(DropReason::NotConnected);
            }
            Err(e) => {
                tracing::debug!(event_type, error = %e, "Failed to queue outbound message");
                metrics::record_message_dropped(DropReason::Encode);
            }
        }
    }

    fn emit(&self, event: &str, data: &Value) {
        let report = self.registry.dispatch(event, data);
        if report.has_failures() {
            for failure in &report.failures {
                tracing::warn!(
                    event_type = event,
                    subscription = failure.id.as_u64(),
                    error = %failure.message,
                    "Event handler panicked"
                );
            }
            metrics::record_handler_panics(report.failures.len());
        }
    }

    fn open_transport(&self) -> Option<Arc<dyn Transport>> {
        let conn = self.connection.lock();
        conn.transport
            .as_ref()
            .filter(|t| t.ready_state().is_open())
            .map(Arc::clone)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection.lock().generation == generation
    }

    fn is_connecting(&self, generation: u64) -> bool {
        let conn = self.connection.lock();
        conn.generation == generation && conn.phase == ConnectionPhase::Connecting
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::application::ports::MockTokenProvider;

    struct RefusingConnector {
        calls: AtomicUsize,
    }

    impl RefusingConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TransportConnector for RefusingConnector {
        fn connect(
            &self,
            _url: &str,
        ) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::ConnectFailed("refused".to_string()))
        }
    }

    fn client_with(tokens: MockTokenProvider, connector: Arc<RefusingConnector>) -> RealtimeClient {
        RealtimeClient::new(
            RealtimeClientConfig::new("ws://localhost:8000/ws"),
            Arc::new(tokens),
            connector,
        )
    }

    fn recorder(client: &RealtimeClient, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on(event, move |data| sink.lock().push(data.clone()));
        seen
    }

    #[test]
    fn config_from_settings() {
        let settings = RealtimeSettings {
            user_id: Some("u-1".to_string()),
            max_reconnect_attempts: 3,
            ..RealtimeSettings::default()
        };
        let config = RealtimeClientConfig::from_settings(&settings);
        assert_eq!(config.url, settings.ws_url);
        assert_eq!(config.user_id.as_deref(), Some("u-1"));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(30));
    }

    #[test]
    fn malformed_frames_are_dropped_without_dispatch() {
        let client = client_with(MockTokenProvider::new(), RefusingConnector::new());
        let hits = Arc::new(AtomicUsize::new(0));
        for event in ["x", "new_message"] {
            let counter = Arc::clone(&hits);
            client.on(event, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        client.inner.handle_message("not json at all");
        client.inner.handle_message(r#"{"data": 1}"#);
        client.inner.handle_message(r#"{"type": 7, "data": {}}"#);
        client.inner.handle_message("[1, 2, 3]");

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn well_formed_frame_reaches_subscriber() {
        let client = client_with(MockTokenProvider::new(), RefusingConnector::new());
        let seen = recorder(&client, "new_message");

        client
            .inner
            .handle_message(r#"{"type":"new_message","data":{"text":"hi"}}"#);

        assert_eq!(*seen.lock(), vec![json!({"text": "hi"})]);
    }

    #[test]
    fn panicking_handler_does_not_block_the_next() {
        let client = client_with(MockTokenProvider::new(), RefusingConnector::new());
        client.on("x", |_| panic!("boom"));
        let seen = recorder(&client, "x");

        client.inner.handle_message(r#"{"type":"x","data":{"n":1}}"#);

        assert_eq!(*seen.lock(), vec![json!({"n": 1})]);
    }

    #[test]
    fn send_while_disconnected_is_dropped() {
        let connector = RefusingConnector::new();
        let client = client_with(MockTokenProvider::new(), Arc::clone(&connector));

        client.send("ping", &json!({}));
        client.join_conversation("c-1");
        client.subscribe_price_alerts();

        assert!(!client.is_connected());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn connect_without_runtime_stays_disconnected() {
        let client = client_with(MockTokenProvider::new(), RefusingConnector::new());
        let errors = recorder(&client, events::ERROR);

        client.connect();

        assert_eq!(client.state(), ConnectionPhase::Disconnected);
        assert_eq!(errors.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_schedules_reconnect() {
        let mut tokens = MockTokenProvider::new();
        tokens.expect_token().returning(|| Ok(None));
        let connector = RefusingConnector::new();
        let client = client_with(tokens, Arc::clone(&connector));
        let errors = recorder(&client, events::ERROR);
        let reconnecting = recorder(&client, events::RECONNECTING);

        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(client.state(), ConnectionPhase::Disconnected);
        assert_eq!(client.reconnect_attempts(), 1);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            *errors.lock(),
            vec![json!({"message": "no auth token available"})]
        );
        assert_eq!(
            *reconnecting.lock(),
            vec![json!({"attempt": 1, "delay_ms": 1000})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_ignored_while_connecting() {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_token()
            .times(1)
            .returning(|| Ok(Some("tok".to_string())));
        let connector = RefusingConnector::new();
        let client = client_with(tokens, Arc::clone(&connector));

        client.connect();
        assert_eq!(client.state(), ConnectionPhase::Connecting);
        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.reconnect_attempts(), 1);
        client.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn token_storage_failure_is_reported() {
        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_token()
            .returning(|| Err(TokenError::Unavailable("keychain locked".to_string())));
        let client = client_with(tokens, RefusingConnector::new());
        let errors = recorder(&client, events::ERROR);

        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]["message"]
            .as_str()
            .unwrap()
            .contains("keychain locked"));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let mut tokens = MockTokenProvider::new();
        tokens.expect_token().times(1).returning(|| Ok(None));
        let client = client_with(tokens, RefusingConnector::new());

        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.reconnect_attempts(), 1);

        client.disconnect();
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.state(), ConnectionPhase::Disconnected);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.reconnect_attempts(), 0);
    }
}

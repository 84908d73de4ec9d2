//! In-memory transport shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use marketplace_realtime::infrastructure::realtime::{RealtimeClientConfig, StaticTokenProvider};
use marketplace_realtime::{
    ReadyState, RealtimeClient, Transport, TransportConnector, TransportError, TransportEvent,
    TransportEvents,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub const TEST_URL: &str = "ws://test.local/ws";
pub const TEST_TOKEN: &str = "tok";

// =============================================================================
// Mock Socket
// =============================================================================

/// One fake socket. The test drives its lifecycle; the client drives sends.
pub struct MockSocket {
    pub url: String,
    state: AtomicU8,
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<(u16, String)>>,
    stall_close: AtomicBool,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockSocket {
    /// Make `close()` leave the socket in Closing without reporting a close.
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }

    /// Complete the handshake.
    pub fn open(&self) {
        self.state.store(ReadyState::Open as u8, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Open);
    }

    /// Deliver an inbound text frame.
    pub fn receive(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    /// Report a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Server-side close with `code`.
    pub fn close_from_server(&self, code: u16) {
        self.state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Close {
            code,
            reason: String::new(),
        });
    }

    /// Change the ready state without emitting any event.
    pub fn set_ready_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Raw frames written by the client.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Frames written by the client, parsed.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Frames of one event type.
    pub fn sent_of_type(&self, event_type: &str) -> Vec<Value> {
        self.sent_json()
            .into_iter()
            .filter(|frame| frame["type"] == event_type)
            .collect()
    }

    /// Close calls made by the client.
    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().clone()
    }
}

impl Transport for MockSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.ready_state().is_open() {
            return Err(TransportError::NotOpen);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        self.closes.lock().push((code, reason.to_string()));
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        if self.stall_close.load(Ordering::SeqCst) {
            self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
            return;
        }
        self.state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

// =============================================================================
// Mock Connector
// =============================================================================

/// Hands out a fresh [`MockSocket`] per connection attempt.
#[derive(Default)]
pub struct MockConnector {
    sockets: Mutex<Vec<Arc<MockSocket>>>,
}

impl MockConnector {
    pub fn count(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn socket(&self, index: usize) -> Arc<MockSocket> {
        Arc::clone(&self.sockets.lock()[index])
    }

    pub fn latest(&self) -> Arc<MockSocket> {
        Arc::clone(self.sockets.lock().last().expect("at least one socket"))
    }
}

impl TransportConnector for MockConnector {
    fn connect(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        let (events, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(MockSocket {
            url: url.to_string(),
            state: AtomicU8::new(ReadyState::Connecting as u8),
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            stall_close: AtomicBool::new(false),
            events,
        });
        self.sockets.lock().push(Arc::clone(&socket));
        Ok((socket, rx))
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn test_config() -> RealtimeClientConfig {
    RealtimeClientConfig::new(TEST_URL)
}

pub fn setup_with(config: RealtimeClientConfig) -> (RealtimeClient, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::default());
    let client = RealtimeClient::new(
        config,
        Arc::new(StaticTokenProvider::new(TEST_TOKEN)),
        Arc::clone(&connector) as Arc<dyn TransportConnector>,
    );
    (client, connector)
}

pub fn setup() -> (RealtimeClient, Arc<MockConnector>) {
    setup_with(test_config())
}

/// Record every payload dispatched for `event`.
pub fn record(client: &RealtimeClient, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(event, move |data| sink.lock().push(data.clone()));
    seen
}

/// Let spawned tasks run without advancing time meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Connect and complete the handshake on the first socket.
pub async fn connect_and_open(
    client: &RealtimeClient,
    connector: &MockConnector,
) -> Arc<MockSocket> {
    client.connect();
    settle().await;
    let socket = connector.latest();
    socket.open();
    settle().await;
    socket
}

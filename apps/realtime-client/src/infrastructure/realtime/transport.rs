//! WebSocket Transport
//!
//! [`TransportConnector`] implementation over `tokio-tungstenite`.
//!
//! `connect()` returns immediately with a handle in the `Connecting` state
//! and spawns a socket task that performs the handshake and then pumps
//! frames in both directions. The task reports through the event channel:
//!
//! - `Open` once the handshake completes
//! - `Message` for every text frame
//! - `Error` for transport failures
//! - exactly one `Close` when the socket is gone (1006 if it dropped without
//!   a close frame)
//!
//! Server pings are answered automatically. Binary frames are ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::application::ports::{
    Transport, TransportConnector, TransportError, TransportEvent, TransportEvents,
};
use crate::domain::connection::{ABNORMAL_CLOSURE, NORMAL_CLOSURE, ReadyState};

/// How long to wait for the server to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

enum Command {
    Text(String),
    Close { code: u16, reason: String },
}

// =============================================================================
// Connector
// =============================================================================

/// Opens `ws://` and `wss://` sockets with `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransportConnector for TungsteniteConnector {
    fn connect(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::NoRuntime(e.to_string()))?;

        let request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        runtime.spawn(run_socket(
            request,
            Arc::clone(&state),
            command_rx,
            event_tx,
        ));

        let transport = TungsteniteTransport {
            state,
            commands: command_tx,
        };

        Ok((Arc::new(transport), event_rx))
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle to one socket task.
#[derive(Debug)]
pub struct TungsteniteTransport {
    state: Arc<AtomicU8>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Close { code, .. } => f.debug_struct("Close").field("code", code).finish(),
        }
    }
}

impl Transport for TungsteniteTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.ready_state().is_open() {
            return Err(TransportError::NotOpen);
        }

        self.commands
            .send(Command::Text(text))
            .map_err(|_| TransportError::SendFailed("socket task stopped".to_string()))
    }

    fn close(&self, code: u16, reason: &str) {
        let previous = self.state.swap(ReadyState::Closing as u8, Ordering::SeqCst);
        if matches!(
            ReadyState::from_u8(previous),
            ReadyState::Closing | ReadyState::Closed
        ) {
            self.state.store(previous, Ordering::SeqCst);
            return;
        }

        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

// =============================================================================
// Socket Task
// =============================================================================

async fn run_socket(
    request: Request,
    state: Arc<AtomicU8>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let handshake = tokio_tungstenite::connect_async(request);
    tokio::pin!(handshake);

    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((ws_stream, _response)) => break ws_stream,
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket handshake failed");
                    finish(&state, &events, Some(e.to_string()), ABNORMAL_CLOSURE, String::new());
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Text(_)) => {}
                Some(Command::Close { code, reason }) => {
                    finish(&state, &events, None, code, reason);
                    return;
                }
                None => {
                    finish(&state, &events, None, NORMAL_CLOSURE, String::new());
                    return;
                }
            },
        }
    };

    if state
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
    {
        let _ = events.send(TransportEvent::Open);
    }

    let (mut write, mut read) = ws_stream.split();

    let close_timer = tokio::time::sleep(Duration::from_secs(86_400));
    tokio::pin!(close_timer);

    let mut close_sent: Option<(u16, String)> = None;
    let mut close_received: Option<(u16, String)> = None;
    let mut error: Option<String> = None;

    loop {
        tokio::select! {
            command = commands.recv(), if close_sent.is_none() => {
                let (code, reason) = match command {
                    Some(Command::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            error = Some(e.to_string());
                            break;
                        }
                        continue;
                    }
                    Some(Command::Close { code, reason }) => (code, reason),
                    None => (NORMAL_CLOSURE, String::new()),
                };

                state.store(ReadyState::Closing as u8, Ordering::SeqCst);
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                if write.send(Message::Close(Some(frame))).await.is_err() {
                    close_received.get_or_insert((code, reason));
                    break;
                }
                close_sent = Some((code, reason));
                close_timer.as_mut().reset(Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
            }
            () = &mut close_timer, if close_sent.is_some() => {
                tracing::debug!("Close handshake timed out");
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(bytes = text.len(), "WebSocket text frame");
                    let _ = events.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    state.store(ReadyState::Closing as u8, Ordering::SeqCst);
                    close_received = Some(frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.to_string()),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => break,
                Some(Err(e)) => {
                    error = Some(e.to_string());
                    break;
                }
            },
        }
    }

    let (code, reason) = close_received
        .or(close_sent)
        .unwrap_or((ABNORMAL_CLOSURE, String::new()));

    finish(&state, &events, error, code, reason);
}

fn finish(
    state: &AtomicU8,
    events: &mpsc::UnboundedSender<TransportEvent>,
    error: Option<String>,
    code: u16,
    reason: String,
) {
    state.store(ReadyState::Closed as u8, Ordering::SeqCst);
    if let Some(message) = error {
        let _ = events.send(TransportEvent::Error(message));
    }
    let _ = events.send(TransportEvent::Close { code, reason });
}

//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TokenProvider`: read-only access to the previously issued auth token
//! - `TransportConnector`: constructs one socket per connection attempt
//! - `Transport`: the live socket handle (send, close, ready state)
//!
//! Transports report progress through a channel of [`TransportEvent`]s,
//! mirroring the `open` / `message` / `close` / `error` callbacks of a
//! browser WebSocket.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::connection::ReadyState;

// =============================================================================
// Token Storage
// =============================================================================

/// Errors reading the auth token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The backing store could not be read.
    #[error("token storage unavailable: {0}")]
    Unavailable(String),

    /// I/O failure reading a token file.
    #[error("token storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Secure storage holding the auth token used to open the connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch the current token. `Ok(None)` means the user is not signed in.
    async fn token(&self) -> Result<Option<String>, TokenError>;
}

// =============================================================================
// Transport
// =============================================================================

/// Errors raised by transports.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be constructed.
    #[error("transport connect failed: {0}")]
    ConnectFailed(String),

    /// A frame was sent on a socket that is not open.
    #[error("transport is not open")]
    NotOpen,

    /// Sending a frame failed.
    #[error("transport send failed: {0}")]
    SendFailed(String),

    /// No async runtime is available to drive the socket.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// Events reported by a transport over its lifetime.
///
/// A well-behaved transport reports at most one `Open` and ends with exactly
/// one `Close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The socket closed.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A transport-level error; a `Close` follows.
    Error(String),
}

/// Receiver half of a transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Handle to one live socket.
pub trait Transport: Send + Sync {
    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not open or the frame cannot be queued.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Start the close handshake. Idempotent.
    fn close(&self, code: u16, reason: &str);
}

/// Socket factory.
pub trait TransportConnector: Send + Sync {
    /// Begin connecting to `url` and return immediately.
    ///
    /// Establishment is observed later through the returned event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot even be constructed (bad URL,
    /// no runtime).
    fn connect(&self, url: &str) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError>;
}

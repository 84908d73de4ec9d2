//! Connection Lifecycle Types
//!
//! States of the single logical connection owned by the realtime client and
//! the WebSocket close codes it reasons about.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Open
//!      ▲                          │                 │
//!      │                     error/failure     close / disconnect()
//!      │                          ▼                 ▼
//!      └──── reconnect timer ◄── Disconnected    Closing ──► Closed
//! ```

use std::fmt;

// =============================================================================
// Close Codes
// =============================================================================

/// Clean, client-initiated closure. Never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// The peer went away (server shutdown, page navigation).
pub const GOING_AWAY: u16 = 1001;

/// The socket dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Returns `true` if a close with this code must schedule a reconnect.
#[must_use]
pub const fn is_abnormal_close(code: u16) -> bool {
    code != NORMAL_CLOSURE
}

// =============================================================================
// Connection Phase
// =============================================================================

/// Lifecycle phase of the client's logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No socket. Entered on construction, explicit disconnect, while waiting
    /// for a reconnect timer, or after reconnect attempts are exhausted.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport reported `open`.
    Open,
    /// `disconnect()` closed the socket and the close event is pending.
    Closing,
    /// The server closed the socket cleanly.
    Closed,
}

impl ConnectionPhase {
    /// Whether a `connect()` call should be ignored in this phase.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Get the phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transport Ready State
// =============================================================================

/// Ready state of a single transport instance, as in the WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    #[default]
    Connecting = 0,
    /// Frames can be sent.
    Open = 1,
    /// Close handshake started.
    Closing = 2,
    /// Socket is gone.
    Closed = 3,
}

impl ReadyState {
    /// Decode from the `u8` representation, treating unknown values as closed.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Check if frames can be sent.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

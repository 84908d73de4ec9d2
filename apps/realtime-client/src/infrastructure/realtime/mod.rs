//! Realtime WebSocket Adapters
//!
//! The reconnecting client and everything it is built from:
//!
//! - **client**: connection lifecycle, dispatch and convenience senders
//! - **codec**: JSON envelope framing
//! - **reconnect** / **heartbeat**: backoff policy and keep-alive ticks
//! - **messages**: typed outbound messages and inbound payloads
//! - **transport**: `tokio-tungstenite` socket adapter
//! - **auth**: token providers and connection URL building

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use auth::{
    AUTH_TOKEN_ENV, AUTH_TOKEN_FILE_ENV, AuthToken, EnvTokenProvider, FileTokenProvider,
    StaticTokenProvider, connection_url,
};
pub use client::{ConnectError, RealtimeClient, RealtimeClientConfig};
pub use codec::{CodecError, EnvelopeCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager};
pub use messages::*;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::{TungsteniteConnector, TungsteniteTransport};

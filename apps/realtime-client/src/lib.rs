#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Marketplace Realtime - Reconnecting WebSocket Client
//!
//! Keeps one authenticated WebSocket connection to the marketplace message
//! server alive and exposes a publish/subscribe interface over a JSON
//! envelope protocol: conversations, typing indicators, chat messages and
//! order / price alert / dispute subscriptions.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure protocol and lifecycle types
//!   - `envelope`: Wire envelope and event names
//!   - `registry`: Event name → ordered handler list
//!   - `connection`: Connection phases, ready states, close codes
//!
//! - **Application**: Port definitions
//!   - `ports`: Token storage, socket factory, transport events
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `realtime`: Client, codec, reconnect policy, heartbeat, transport
//!   - `config`: Environment-driven settings
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────────┐   frames   ┌──────────┐   data   ┌─────────────┐
//! Message server ◄─┤   Transport    ├───────────►│  Codec   ├─────────►│  Registry   ├──► handlers
//!                  └───────▲────────┘            └──────────┘          └─────────────┘
//!                          │ ping / outbound envelopes
//!                  ┌───────┴────────┐
//!                  │ RealtimeClient │◄── connect() / disconnect() / send()
//!                  └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core realtime types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionPhase, NORMAL_CLOSURE, ReadyState};
pub use domain::envelope::{Envelope, events};
pub use domain::registry::{DispatchReport, SubscriberRegistry, SubscriptionId};

// Ports
pub use application::ports::{
    TokenError, TokenProvider, Transport, TransportConnector, TransportError, TransportEvent,
    TransportEvents,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Environment, RealtimeSettings};

// Realtime client
pub use infrastructure::realtime::{
    ConnectError, InboundEvent, MessageKind, OutboundMessage, RealtimeClient,
    RealtimeClientConfig,
};

// Metrics
pub use infrastructure::metrics::{install_prometheus, register_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};

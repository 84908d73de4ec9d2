//! Prometheus Metrics Module
//!
//! Instruments the realtime client through the `metrics` facade. Without an
//! installed recorder every call is a no-op, so library users pay nothing
//! unless they opt in.
//!
//! # Metrics
//!
//! - `realtime_messages_received_total`: inbound frames accepted
//! - `realtime_messages_dropped_total{reason}`: frames dropped
//! - `realtime_messages_sent_total{event_type}`: outbound envelopes written
//! - `realtime_reconnect_attempts_total`: reconnects scheduled
//! - `realtime_handler_panics_total`: subscriber panics isolated
//! - `realtime_connected`: 1 while the socket is open

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Recorder Installation
// =============================================================================

/// Install a Prometheus recorder serving `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();
    Ok(())
}

/// Describe every metric emitted by the client.
pub fn register_metrics() {
    describe_counter!(
        "realtime_messages_received_total",
        "Inbound frames accepted and dispatched"
    );
    describe_counter!(
        "realtime_messages_dropped_total",
        "Frames dropped, by reason"
    );
    describe_counter!(
        "realtime_messages_sent_total",
        "Outbound envelopes written to the socket"
    );
    describe_counter!(
        "realtime_reconnect_attempts_total",
        "Reconnection attempts scheduled"
    );
    describe_counter!(
        "realtime_handler_panics_total",
        "Subscriber handlers that panicked during dispatch"
    );
    describe_gauge!(
        "realtime_connected",
        "1 while the realtime socket is open, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Inbound frame was not a valid envelope.
    Malformed,
    /// Outbound send while the socket was not open.
    NotConnected,
    /// Outbound payload could not be encoded or queued.
    Encode,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::NotConnected => "not_connected",
            Self::Encode => "encode",
        }
    }
}

/// Record an inbound frame.
pub fn record_message_received() {
    counter!("realtime_messages_received_total").increment(1);
}

/// Record a dropped frame.
pub fn record_message_dropped(reason: DropReason) {
    counter!("realtime_messages_dropped_total", "reason" => reason.as_str()).increment(1);
}

/// Record an outbound envelope.
pub fn record_message_sent(event_type: &str) {
    counter!("realtime_messages_sent_total", "event_type" => event_type.to_string()).increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("realtime_reconnect_attempts_total").increment(1);
}

/// Record isolated handler panics.
pub fn record_handler_panics(count: usize) {
    counter!("realtime_handler_panics_total").increment(count as u64);
}

/// Update the connected gauge.
pub fn set_connected(connected: bool) {
    gauge!("realtime_connected").set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_as_str() {
        assert_eq!(DropReason::Malformed.as_str(), "malformed");
        assert_eq!(DropReason::NotConnected.as_str(), "not_connected");
        assert_eq!(DropReason::Encode.as_str(), "encode");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_message_received();
        record_message_dropped(DropReason::Malformed);
        record_message_sent("ping");
        record_reconnect();
        record_handler_panics(2);
        set_connected(true);
    }
}

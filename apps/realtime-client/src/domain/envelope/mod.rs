//! Wire Envelope
//!
//! Every frame exchanged with the message server is a JSON object wrapping an
//! opaque payload:
//!
//! ```json
//! {"type": "new_message", "data": {"text": "hi"}, "timestamp": "2024-01-15T10:00:00Z", "user_id": "u-1"}
//! ```
//!
//! Only `type` is required on receipt. The shape of `data` is decided entirely
//! by `type` and is not validated here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Event Names
// =============================================================================

/// Event names used by the client and the server.
///
/// The client is type-agnostic on receipt: any server-pushed `type` can be
/// subscribed to, these are only the names the client itself emits or sends.
pub mod events {
    // Lifecycle events emitted locally by the client.

    /// Transport opened.
    pub const CONNECTION: &str = "connection";
    /// Transport closed.
    pub const DISCONNECTION: &str = "disconnection";
    /// Transport or connect failure.
    pub const ERROR: &str = "error";
    /// A reconnect was scheduled.
    pub const RECONNECTING: &str = "reconnecting";
    /// Reconnect attempts exhausted; terminal until an explicit `connect()`.
    pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";

    // Outbound event names.

    /// Heartbeat keep-alive.
    pub const PING: &str = "ping";
    /// Join a conversation room.
    pub const JOIN_CONVERSATION: &str = "join_conversation";
    /// Leave a conversation room.
    pub const LEAVE_CONVERSATION: &str = "leave_conversation";
    /// Typing indicator with an explicit flag.
    pub const TYPING: &str = "typing";
    /// Typing started.
    pub const TYPING_START: &str = "typing_start";
    /// Typing stopped.
    pub const TYPING_STOP: &str = "typing_stop";
    /// Chat message.
    pub const CHAT_MESSAGE: &str = "chat_message";
    /// Subscribe to status updates for one order.
    pub const SUBSCRIBE_ORDER: &str = "subscribe_order";
    /// Subscribe to price alert broadcasts.
    pub const SUBSCRIBE_PRICE_ALERTS: &str = "subscribe_price_alerts";
    /// Subscribe to dispute broadcasts.
    pub const SUBSCRIBE_DISPUTES: &str = "subscribe_disputes";

    // Server-pushed event names with known payloads.

    /// Heartbeat reply.
    pub const PONG: &str = "pong";
    /// New chat message in a joined conversation.
    pub const NEW_MESSAGE: &str = "new_message";
    /// Legacy name for a chat message.
    pub const MESSAGE: &str = "message";
    /// Order status changed.
    pub const ORDER_STATUS_UPDATE: &str = "order_status_update";
    /// A price alert fired.
    pub const PRICE_ALERT_TRIGGERED: &str = "price_alert_triggered";
    /// Dispute changed.
    pub const DISPUTE_UPDATE: &str = "dispute_update";
    /// Generic user notification.
    pub const NOTIFICATION: &str = "notification";
}

// =============================================================================
// Envelope
// =============================================================================

/// A single framed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name; selects the payload shape.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Opaque payload. Absent on the wire decodes to `null`.
    #[serde(default)]
    pub data: Value,

    /// Send time. Always set on outbound envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Sending user, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Envelope {
    /// Build an outbound envelope stamped with the current time.
    #[must_use]
    pub fn outbound(event_type: impl Into<String>, data: Value, user_id: Option<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Some(Utc::now()),
            user_id,
        }
    }

    /// Build an envelope without a timestamp, as servers commonly push them.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: None,
            user_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_is_timestamped() {
        let before = Utc::now();
        let envelope = Envelope::outbound(events::PING, json!({}), None);
        assert_eq!(envelope.event_type, "ping");
        assert!(envelope.timestamp.unwrap() >= before);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let envelope = Envelope::outbound(
            events::JOIN_CONVERSATION,
            json!({"conversation_id": "c-1"}),
            Some("u-7".to_string()),
        );
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "join_conversation");
        assert_eq!(value["data"]["conversation_id"], "c-1");
        assert_eq!(value["user_id"], "u-7");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let envelope = Envelope::new("x", json!(1));
        let text = serde_json::to_string(&envelope).unwrap();
        assert_eq!(text, r#"{"type":"x","data":1}"#);
    }
}

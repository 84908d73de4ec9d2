//! Realtime Message Types
//!
//! Typed views over the envelope protocol.
//!
//! # Outbound
//!
//! [`OutboundMessage`] fixes the event name and payload shape for every
//! convenience operation on the client:
//!
//! | Operation | `type` | `data` |
//! |---|---|---|
//! | join / leave room | `join_conversation` / `leave_conversation` | `{"conversation_id"}` |
//! | typing flag | `typing` | `{"conversation_id","is_typing"}` |
//! | typing start / stop | `typing_start` / `typing_stop` | `{"conversation_id"}` |
//! | chat message | `chat_message` | `{"conversation_id","content","message_type"}` |
//! | order updates | `subscribe_order` | `{"order_id"}` |
//! | price alerts / disputes | `subscribe_price_alerts` / `subscribe_disputes` | `{}` |
//!
//! # Inbound
//!
//! [`InboundEvent`] decodes the server-pushed events with known payloads.
//! Unknown event names are preserved verbatim as [`InboundEvent::Other`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::codec::CodecError;
use crate::domain::envelope::{Envelope, events};

// =============================================================================
// Outbound Payloads
// =============================================================================

/// Kind of chat message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image URL in `content`.
    Image,
    /// Price offer on a listing.
    Offer,
}

/// Messages the client knows how to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Heartbeat keep-alive with an empty payload.
    Ping,
    /// Join a conversation room.
    JoinConversation {
        /// Room identifier.
        conversation_id: String,
    },
    /// Leave a conversation room.
    LeaveConversation {
        /// Room identifier.
        conversation_id: String,
    },
    /// Typing indicator with an explicit flag.
    Typing {
        /// Room identifier.
        conversation_id: String,
        /// Whether the user is typing.
        is_typing: bool,
    },
    /// Typing started.
    TypingStart {
        /// Room identifier.
        conversation_id: String,
    },
    /// Typing stopped.
    TypingStop {
        /// Room identifier.
        conversation_id: String,
    },
    /// Chat message.
    ChatMessage {
        /// Room identifier.
        conversation_id: String,
        /// Message body.
        content: String,
        /// Content kind.
        message_type: MessageKind,
    },
    /// Subscribe to one order's status updates.
    SubscribeOrder {
        /// Order identifier.
        order_id: String,
    },
    /// Subscribe to price alert broadcasts.
    SubscribePriceAlerts,
    /// Subscribe to dispute broadcasts.
    SubscribeDisputes,
}

impl OutboundMessage {
    /// Wire event name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Ping => events::PING,
            Self::JoinConversation { .. } => events::JOIN_CONVERSATION,
            Self::LeaveConversation { .. } => events::LEAVE_CONVERSATION,
            Self::Typing { .. } => events::TYPING,
            Self::TypingStart { .. } => events::TYPING_START,
            Self::TypingStop { .. } => events::TYPING_STOP,
            Self::ChatMessage { .. } => events::CHAT_MESSAGE,
            Self::SubscribeOrder { .. } => events::SUBSCRIBE_ORDER,
            Self::SubscribePriceAlerts => events::SUBSCRIBE_PRICE_ALERTS,
            Self::SubscribeDisputes => events::SUBSCRIBE_DISPUTES,
        }
    }

    /// Wire payload.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::Ping | Self::SubscribePriceAlerts | Self::SubscribeDisputes => {
                Value::Object(Map::new())
            }
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::TypingStart { conversation_id }
            | Self::TypingStop { conversation_id } => {
                json!({ "conversation_id": conversation_id })
            }
            Self::Typing {
                conversation_id,
                is_typing,
            } => json!({ "conversation_id": conversation_id, "is_typing": is_typing }),
            Self::ChatMessage {
                conversation_id,
                content,
                message_type,
            } => json!({
                "conversation_id": conversation_id,
                "content": content,
                "message_type": message_type,
            }),
            Self::SubscribeOrder { order_id } => json!({ "order_id": order_id }),
        }
    }
}

// =============================================================================
// Inbound Payloads
// =============================================================================

/// A chat message pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Room the message belongs to.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Author.
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Message body. Older servers send `text`.
    #[serde(alias = "text")]
    pub content: String,
    /// Content kind.
    #[serde(default)]
    pub message_type: MessageKind,
    /// Server receive time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Typing indicator pushed for another participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    /// Room identifier.
    pub conversation_id: String,
    /// Who is typing.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Explicit flag; implied by `typing_start` / `typing_stop`.
    #[serde(default)]
    pub is_typing: Option<bool>,
}

/// Order lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    /// Order identifier.
    pub order_id: String,
    /// New status, e.g. `shipped`.
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
    /// When the change happened.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A price alert that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAlert {
    /// Listing the alert watches.
    pub product_id: String,
    /// Listing title, when provided.
    #[serde(default)]
    pub product_name: Option<String>,
    /// Price that triggered the alert.
    pub current_price: Decimal,
    /// Threshold the user configured.
    #[serde(default)]
    pub target_price: Option<Decimal>,
}

/// Dispute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeUpdate {
    /// Dispute identifier.
    pub dispute_id: String,
    /// New status, e.g. `under_review`.
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

/// Generic user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short title.
    pub title: String,
    /// Body text.
    #[serde(default, alias = "message")]
    pub body: Option<String>,
    /// Category used for routing in the UI.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Server-pushed events with decoded payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Heartbeat reply.
    Pong,
    /// Chat message (`new_message` or legacy `message`).
    NewMessage(ChatMessage),
    /// Typing indicator (`typing`, `typing_start`, `typing_stop`).
    Typing(TypingIndicator),
    /// `order_status_update`.
    OrderStatusUpdate(OrderStatusUpdate),
    /// `price_alert_triggered`.
    PriceAlertTriggered(PriceAlert),
    /// `dispute_update`.
    DisputeUpdate(DisputeUpdate),
    /// `notification`.
    Notification(Notification),
    /// Any other event, forwarded verbatim.
    Other {
        /// Event name.
        event_type: String,
        /// Raw payload.
        data: Value,
    },
}

impl InboundEvent {
    /// Decode the payload of a known event.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Payload`] if a known event carries a payload of
    /// the wrong shape. Unknown events never fail.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, CodecError> {
        let event_type = envelope.event_type.as_str();

        Ok(match event_type {
            events::PONG => Self::Pong,
            events::NEW_MESSAGE | events::MESSAGE => {
                Self::NewMessage(decode_payload(event_type, &envelope.data)?)
            }
            events::TYPING | events::TYPING_START | events::TYPING_STOP => {
                let mut indicator: TypingIndicator = decode_payload(event_type, &envelope.data)?;
                match event_type {
                    events::TYPING_START => indicator.is_typing = Some(true),
                    events::TYPING_STOP => indicator.is_typing = Some(false),
                    _ => {}
                }
                Self::Typing(indicator)
            }
            events::ORDER_STATUS_UPDATE => {
                Self::OrderStatusUpdate(decode_payload(event_type, &envelope.data)?)
            }
            events::PRICE_ALERT_TRIGGERED => {
                Self::PriceAlertTriggered(decode_payload(event_type, &envelope.data)?)
            }
            events::DISPUTE_UPDATE => {
                Self::DisputeUpdate(decode_payload(event_type, &envelope.data)?)
            }
            events::NOTIFICATION => {
                Self::Notification(decode_payload(event_type, &envelope.data)?)
            }
            _ => Self::Other {
                event_type: envelope.event_type.clone(),
                data: envelope.data.clone(),
            },
        })
    }

    /// Event name this value was decoded from, normalized for aliases.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Pong => events::PONG,
            Self::NewMessage(_) => events::NEW_MESSAGE,
            Self::Typing(_) => events::TYPING,
            Self::OrderStatusUpdate(_) => events::ORDER_STATUS_UPDATE,
            Self::PriceAlertTriggered(_) => events::PRICE_ALERT_TRIGGERED,
            Self::DisputeUpdate(_) => events::DISPUTE_UPDATE,
            Self::Notification(_) => events::NOTIFICATION,
            Self::Other { event_type, .. } => event_type,
        }
    }
}

/// Decode an event payload into `T`.
///
/// # Errors
///
/// Returns [`CodecError::Payload`] if `data` does not match `T`.
pub fn decode_payload<T: DeserializeOwned>(event_type: &str, data: &Value) -> Result<T, CodecError> {
    T::deserialize(data).map_err(|source| CodecError::Payload {
        event_type: event_type.to_string(),
        source,
    })
}

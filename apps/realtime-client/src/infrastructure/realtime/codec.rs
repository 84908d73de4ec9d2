//! Envelope Codec
//!
//! JSON text framing for the realtime protocol. Each frame is one
//! [`Envelope`] object.
//!
//! Decoding is deliberately loose: the only hard requirement is a string
//! `type` field. A missing `data` decodes to `null` and an unparseable
//! `timestamp` is discarded rather than failing the frame.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::envelope::Envelope;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame parsed but is not a JSON object.
    #[error("expected JSON object frame, got {0}")]
    NotAnObject(&'static str),

    /// The `type` field is absent.
    #[error("frame has no `type` field")]
    MissingType,

    /// The `type` field is not a string.
    #[error("frame `type` field must be a string, got {0}")]
    InvalidType(&'static str),

    /// The payload does not match the shape expected for its event.
    #[error("invalid `{event_type}` payload: {source}")]
    Payload {
        /// Event whose payload failed to decode.
        event_type: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

/// JSON codec for envelopes.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, not an object, or lacks a
    /// string `type`.
    pub fn decode(&self, text: &str) -> Result<Envelope, CodecError> {
        let value: Value = serde_json::from_str(text)?;

        let Value::Object(mut object) = value else {
            return Err(CodecError::NotAnObject(json_kind(&value)));
        };

        let event_type = match object.remove("type") {
            Some(Value::String(s)) => s,
            Some(other) => return Err(CodecError::InvalidType(json_kind(&other))),
            None => return Err(CodecError::MissingType),
        };

        let data = object.remove("data").unwrap_or(Value::Null);
        let timestamp = take_timestamp(&mut object);
        let user_id = match object.remove("user_id") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        Ok(Envelope {
            event_type,
            data,
            timestamp,
            user_id,
        })
    }

    /// Encode an envelope to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, envelope: &Envelope) -> Result<String, CodecError> {
        Ok(serde_json::to_string(envelope)?)
    }
}

fn take_timestamp(object: &mut Map<String, Value>) -> Option<DateTime<Utc>> {
    match object.remove("timestamp") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_full_envelope() {
        let codec = EnvelopeCodec::new();
        let envelope = codec
            .decode(
                r#"{"type":"new_message","data":{"text":"hi"},"timestamp":"2024-01-15T10:00:00Z","user_id":"u-1"}"#,
            )
            .unwrap();

        assert_eq!(envelope.event_type, "new_message");
        assert_eq!(envelope.data, json!({"text": "hi"}));
        assert_eq!(
            envelope.timestamp.unwrap().to_rfc3339(),
            "2024-01-15T10:00:00+00:00"
        );
        assert_eq!(envelope.user_id.as_deref(), Some("u-1"));
    }

    #[test]
    fn decode_minimal_envelope() {
        let envelope = EnvelopeCodec::new().decode(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(envelope.event_type, "pong");
        assert_eq!(envelope.data, Value::Null);
        assert!(envelope.timestamp.is_none());
        assert!(envelope.user_id.is_none());
    }

    #[test]
    fn decode_tolerates_bad_timestamp() {
        let envelope = EnvelopeCodec::new()
            .decode(r#"{"type":"x","data":1,"timestamp":"yesterday"}"#)
            .unwrap();
        assert!(envelope.timestamp.is_none());
        assert_eq!(envelope.data, json!(1));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = EnvelopeCodec::new().decode("not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = EnvelopeCodec::new().decode(r#"{"data": 1}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn decode_rejects_non_string_type() {
        let err = EnvelopeCodec::new()
            .decode(r#"{"type": 7, "data": 1}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidType("number")));
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = EnvelopeCodec::new().decode("[1,2]").unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject("array")));
    }

    #[test]
    fn encode_outbound() {
        let codec = EnvelopeCodec::new();
        let envelope = Envelope::outbound("ping", json!({}), None);

        let text = codec.encode(&envelope).unwrap();
        let decoded = codec.decode(&text).unwrap();

        assert_eq!(decoded.event_type, "ping");
        assert_eq!(decoded.data, json!({}));
        assert!(decoded.timestamp.is_some());
    }
}

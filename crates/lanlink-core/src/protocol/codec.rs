//! JSON codec for encoding and decoding LanLink protocol messages.
//!
//! Wire format on a stream transport:
//! ```text
//! [payload_len:4][payload:N]
//! ```
//! The length prefix is big-endian unsigned. The payload is a UTF-8 JSON
//! document with snake_case field names plus the reserved integer field
//! `"type"` carrying the variant's wire tag. Discovery datagrams carry the
//! same document without the prefix (datagram boundary = message boundary).

use serde::ser::Error as _;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{Message, MessageKind, FRAME_HEADER_SIZE, TYPE_FIELD};
use crate::protocol::registry::{registry, TypeRegistry};

/// Errors that can occur during message encoding or decoding.
///
/// Every variant is fatal to the single codec call that produced it; the
/// codec never returns a partially decoded message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not a well-formed JSON document, or a known variant's
    /// fields failed to deserialize.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The document has no top-level integer `"type"` field.
    #[error("payload has no integer \"{TYPE_FIELD}\" field")]
    MissingType,

    /// The `"type"` field holds a tag with no registered variant.
    #[error("unknown message type {0}")]
    UnknownType(u64),

    /// The message's kind is absent from the registry's reverse mapping.
    #[error("message kind {0:?} is not registered")]
    UnregisteredVariant(MessageKind),

    /// The encoded payload does not fit the 4-byte length prefix.
    #[error("payload of {len} bytes exceeds the frame length limit")]
    OversizedPayload { len: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into its wire document (no length prefix).
///
/// # Errors
///
/// Returns [`CodecError`] if the message's kind is unregistered or
/// serialization fails.
///
/// # Examples
///
/// ```rust
/// use lanlink_core::protocol::codec::{decode_message, encode_message};
/// use lanlink_core::protocol::messages::{AckMessage, Message};
///
/// let msg = Message::Ack(AckMessage { token: 42 });
/// let bytes = encode_message(&msg).unwrap();
/// let decoded = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, CodecError> {
    encode_message_with(registry(), msg)
}

/// Encodes a [`Message`] against an explicit registry.
pub fn encode_message_with(registry: &TypeRegistry, msg: &Message) -> Result<Vec<u8>, CodecError> {
    let descriptor = registry
        .by_kind(msg.kind())
        .ok_or(CodecError::UnregisteredVariant(msg.kind()))?;

    let mut map = match variant_to_value(msg)? {
        Value::Object(map) => map,
        other => {
            return Err(CodecError::Malformed(serde_json::Error::custom(format!(
                "variant {} serialized to non-object value {other}",
                descriptor.name
            ))))
        }
    };
    map.insert(TYPE_FIELD.to_string(), Value::from(descriptor.tag));

    serde_json::to_vec(&Value::Object(map)).map_err(CodecError::from)
}

/// Encodes a [`Message`] into a complete stream frame: 4-byte big-endian
/// length prefix followed by the wire document.
///
/// # Errors
///
/// Returns [`CodecError`] if encoding fails or the payload cannot fit the
/// length prefix.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let payload = encode_message(msg)?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| CodecError::OversizedPayload { len: payload.len() })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes one [`Message`] from a wire document.
///
/// # Errors
///
/// Returns [`CodecError`] if the document is malformed, carries no integer
/// `"type"` field, or names an unregistered tag.
///
/// # Examples
///
/// ```rust
/// use lanlink_core::protocol::codec::{decode_message, CodecError};
///
/// let err = decode_message(br#"{"type": 9999, "token": 1}"#).unwrap_err();
/// assert!(matches!(err, CodecError::UnknownType(9999)));
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<Message, CodecError> {
    decode_message_with(registry(), bytes)
}

/// Decodes one [`Message`] against an explicit registry.
pub fn decode_message_with(registry: &TypeRegistry, bytes: &[u8]) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;

    let tag = value
        .get(TYPE_FIELD)
        .and_then(Value::as_u64)
        .ok_or(CodecError::MissingType)?;

    let descriptor = u16::try_from(tag)
        .ok()
        .and_then(|tag| registry.by_tag(tag))
        .ok_or(CodecError::UnknownType(tag))?;

    (descriptor.decode)(value).map_err(CodecError::from)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn variant_to_value(msg: &Message) -> Result<Value, serde_json::Error> {
    match msg {
        Message::Hello(m) => serde_json::to_value(m),
        Message::Ack(m) => serde_json::to_value(m),
        Message::Event(m) => serde_json::to_value(m),
        Message::Shutdown(m) => serde_json::to_value(m),
        Message::Announce(m) => serde_json::to_value(m),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;
    use crate::protocol::registry::{TypeRegistry, CATALOG};
    use serde_json::json;

    fn round_trip(msg: &Message) -> Message {
        let encoded = encode_message(msg).expect("encode failed");
        decode_message(&encoded).expect("decode failed")
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_hello_round_trip() {
        let msg = Message::Hello(HelloMessage {
            peer_name: "dev-linux".to_string(),
            protocol_version: PROTOCOL_VERSION,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_hello_with_empty_peer_name() {
        let msg = Message::Hello(HelloMessage {
            peer_name: String::new(),
            protocol_version: 0,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_ack_round_trip_with_max_token() {
        let msg = Message::Ack(AckMessage { token: u64::MAX });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_event_round_trip_with_nested_body() {
        let msg = Message::Event(EventMessage {
            topic: "sensors/temperature".to_string(),
            body: json!({ "celsius": 21.5, "readings": [1, 2, 3], "ok": true }),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_event_round_trip_with_null_body() {
        let msg = Message::Event(EventMessage {
            topic: "heartbeat".to_string(),
            body: Value::Null,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_shutdown_round_trip() {
        let msg = Message::Shutdown(ShutdownMessage {
            reason: "maintenance window".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_announce_round_trip() {
        let msg = Message::Announce(AnnounceMessage {
            host: "192.168.1.17".to_string(),
            port: 9300,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    // ── Wire document shape ──────────────────────────────────────────────────

    #[test]
    fn test_document_carries_tag_and_snake_case_fields() {
        let msg = Message::Hello(HelloMessage {
            peer_name: "alpha".to_string(),
            protocol_version: 1,
        });

        let bytes = encode_message(&msg).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value[TYPE_FIELD], json!(1));
        assert_eq!(value["peer_name"], json!("alpha"));
        assert_eq!(value["protocol_version"], json!(1));
    }

    #[test]
    fn test_decode_tolerates_reordered_and_extra_fields() {
        let doc = br#"{"extra": true, "token": 9, "type": 2}"#;

        let decoded = decode_message(doc).unwrap();

        assert_eq!(decoded, Message::Ack(AckMessage { token: 9 }));
    }

    // ── Error paths ──────────────────────────────────────────────────────────

    #[test]
    fn test_decode_unknown_type_returns_error() {
        let err = decode_message(br#"{"type": 99, "token": 1}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(99)));
    }

    #[test]
    fn test_decode_type_beyond_u16_returns_unknown_type() {
        let err = decode_message(br#"{"type": 70000}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(70000)));
    }

    #[test]
    fn test_decode_missing_type_returns_error() {
        let err = decode_message(br#"{"peer_name": "x", "protocol_version": 1}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn test_decode_non_integer_type_returns_error() {
        let err = decode_message(br#"{"type": "hello"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));

        let err = decode_message(br#"{"type": -3}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn test_decode_garbage_returns_malformed() {
        let err = decode_message(b"not a document").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_decode_known_type_with_missing_fields_returns_malformed() {
        let err = decode_message(br#"{"type": 1}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_encode_against_partial_registry_returns_unregistered() {
        // Catalog without the Ack entry.
        let partial: Vec<_> = CATALOG
            .iter()
            .filter(|d| d.kind != MessageKind::Ack)
            .copied()
            .collect();
        let registry = TypeRegistry::from_catalog(&partial).unwrap();

        let err =
            encode_message_with(&registry, &Message::Ack(AckMessage { token: 1 })).unwrap_err();

        assert!(matches!(
            err,
            CodecError::UnregisteredVariant(MessageKind::Ack)
        ));
    }

    // ── Framing ──────────────────────────────────────────────────────────────

    #[test]
    fn test_frame_is_prefix_plus_payload() {
        let messages = [
            Message::Ack(AckMessage { token: 7 }),
            Message::Shutdown(ShutdownMessage {
                reason: "x".repeat(512),
            }),
            Message::Event(EventMessage {
                topic: "t".to_string(),
                body: json!({ "blob": "y".repeat(4096) }),
            }),
        ];

        for msg in &messages {
            let payload = encode_message(msg).unwrap();
            let frame = encode_frame(msg).unwrap();

            assert_eq!(frame.len(), FRAME_HEADER_SIZE + payload.len());
            let prefix = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
            assert_eq!(prefix as usize, payload.len());
            assert_eq!(&frame[FRAME_HEADER_SIZE..], &payload[..]);
        }
    }

    #[test]
    fn test_frame_payload_decodes_back() {
        let msg = Message::Announce(AnnounceMessage {
            host: "10.0.0.5".to_string(),
            port: 4000,
        });

        let frame = encode_frame(&msg).unwrap();
        let decoded = decode_message(&frame[FRAME_HEADER_SIZE..]).unwrap();

        assert_eq!(decoded, msg);
    }
}

//! All LanLink protocol message types.
//!
//! Every message travels as a UTF-8 JSON document with snake_case field names
//! and a reserved top-level integer field `"type"` carrying the wire tag. The
//! tag is injected and consumed by the codec; the structs here only describe
//! the variant-specific fields. None of them may declare a field named `type`.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version advertised in [`HelloMessage`].
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the length prefix framing each message on a stream transport.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Name of the reserved discriminant field in every wire document.
pub const TYPE_FIELD: &str = "type";

// ── Message kinds ─────────────────────────────────────────────────────────────

/// Discriminant names for every message variant.
///
/// Wire tags live in the registry catalog, not here; this enum only names the
/// closed set of variants so lookups and errors can refer to them without
/// carrying a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Ack,
    Event,
    Shutdown,
    Announce,
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// Hello (tag 1): greeting sent by a peer after the session is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Human-readable name of the sending peer.
    pub peer_name: String,
    /// Protocol version the sender speaks; see [`PROTOCOL_VERSION`].
    pub protocol_version: u8,
}

/// Ack (tag 2): lightweight acknowledgement of an earlier message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    /// Caller-chosen correlation token echoed back to the sender.
    pub token: u64,
}

/// Event (tag 3): free-form application payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Application-defined routing key.
    pub topic: String,
    /// Arbitrary JSON value; the fabric does not interpret it.
    pub body: serde_json::Value,
}

/// Shutdown (tag 4): orderly-termination notice from either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownMessage {
    /// Human-readable reason, for logging on the receiving side.
    pub reason: String,
}

/// Announce (tag 16): discovery request and reply.
///
/// A discovery agent builds one of these from its own bound address through
/// the registered endpoint factory and broadcasts it; responders answer with
/// their own service endpoint in the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceMessage {
    /// Address the announcing endpoint can be reached on.
    pub host: String,
    /// Port the announcing endpoint listens on.
    pub port: u16,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid LanLink messages, discriminated by kind.
///
/// Tags 1–15 are reserved for session control, 16 and up for discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(HelloMessage),
    Ack(AckMessage),
    Event(EventMessage),
    Shutdown(ShutdownMessage),
    Announce(AnnounceMessage),
}

impl Message {
    /// Returns the [`MessageKind`] discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::Ack(_) => MessageKind::Ack,
            Message::Event(_) => MessageKind::Event,
            Message::Shutdown(_) => MessageKind::Shutdown,
            Message::Announce(_) => MessageKind::Announce,
        }
    }
}

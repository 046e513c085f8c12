//! Static registration table mapping wire tags to message variants.
//!
//! The catalog is a plain static array validated once at first use: duplicate
//! tags or duplicate kinds are construction errors, so a process that starts
//! successfully holds a registry with a total, unambiguous mapping in both
//! directions. After that the registry is immutable and safe to read from any
//! task without synchronization.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::{
    AckMessage, AnnounceMessage, EventMessage, HelloMessage, Message, MessageKind, ShutdownMessage,
};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while building a [`TypeRegistry`] from a catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("wire tag {tag} registered twice, by {first} and {second}")]
    DuplicateTag {
        tag: u16,
        first: &'static str,
        second: &'static str,
    },
    #[error("message kind {kind:?} registered twice")]
    DuplicateKind { kind: MessageKind },
}

// ── Variant descriptors ───────────────────────────────────────────────────────

/// One catalog entry: everything the codec and the discovery agent need to
/// know about a message variant.
#[derive(Debug, Clone, Copy)]
pub struct VariantDescriptor {
    /// Stable integer discriminant carried in the wire document.
    pub tag: u16,
    /// Which [`Message`] variant this entry describes.
    pub kind: MessageKind,
    /// Lowercase display name used in logs and errors.
    pub name: &'static str,
    /// Deserializes a parsed wire document into the concrete variant.
    pub decode: fn(serde_json::Value) -> Result<Message, serde_json::Error>,
    /// Builds a request of this variant from the requester's own address.
    /// Only meaningful for variants usable as discovery requests.
    pub endpoint_factory: Option<fn(SocketAddr) -> Message>,
}

fn decode_hello(value: serde_json::Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value::<HelloMessage>(value).map(Message::Hello)
}

fn decode_ack(value: serde_json::Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value::<AckMessage>(value).map(Message::Ack)
}

fn decode_event(value: serde_json::Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value::<EventMessage>(value).map(Message::Event)
}

fn decode_shutdown(value: serde_json::Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value::<ShutdownMessage>(value).map(Message::Shutdown)
}

fn decode_announce(value: serde_json::Value) -> Result<Message, serde_json::Error> {
    serde_json::from_value::<AnnounceMessage>(value).map(Message::Announce)
}

fn announce_from_endpoint(endpoint: SocketAddr) -> Message {
    Message::Announce(AnnounceMessage {
        host: endpoint.ip().to_string(),
        port: endpoint.port(),
    })
}

/// The built-in catalog behind [`registry`]. Tags 1–15 are session control,
/// 16 and up are discovery.
pub static CATALOG: [VariantDescriptor; 5] = [
    VariantDescriptor {
        tag: 1,
        kind: MessageKind::Hello,
        name: "hello",
        decode: decode_hello,
        endpoint_factory: None,
    },
    VariantDescriptor {
        tag: 2,
        kind: MessageKind::Ack,
        name: "ack",
        decode: decode_ack,
        endpoint_factory: None,
    },
    VariantDescriptor {
        tag: 3,
        kind: MessageKind::Event,
        name: "event",
        decode: decode_event,
        endpoint_factory: None,
    },
    VariantDescriptor {
        tag: 4,
        kind: MessageKind::Shutdown,
        name: "shutdown",
        decode: decode_shutdown,
        endpoint_factory: None,
    },
    VariantDescriptor {
        tag: 16,
        kind: MessageKind::Announce,
        name: "announce",
        decode: decode_announce,
        endpoint_factory: Some(announce_from_endpoint),
    },
];

// ── Registry ──────────────────────────────────────────────────────────────────

/// Immutable tag ↔ variant mapping built from a catalog.
#[derive(Debug)]
pub struct TypeRegistry {
    by_tag: HashMap<u16, VariantDescriptor>,
    by_kind: HashMap<MessageKind, VariantDescriptor>,
}

impl TypeRegistry {
    /// Builds a registry, rejecting catalogs with duplicate tags or kinds.
    pub fn from_catalog(catalog: &[VariantDescriptor]) -> Result<Self, RegistryError> {
        let mut by_tag = HashMap::with_capacity(catalog.len());
        let mut by_kind = HashMap::with_capacity(catalog.len());

        for descriptor in catalog {
            if let Some(previous) = by_tag.insert(descriptor.tag, *descriptor) {
                return Err(RegistryError::DuplicateTag {
                    tag: descriptor.tag,
                    first: previous.name,
                    second: descriptor.name,
                });
            }
            if by_kind.insert(descriptor.kind, *descriptor).is_some() {
                return Err(RegistryError::DuplicateKind {
                    kind: descriptor.kind,
                });
            }
        }

        Ok(Self { by_tag, by_kind })
    }

    /// Looks up the descriptor for a wire tag.
    pub fn by_tag(&self, tag: u16) -> Option<&VariantDescriptor> {
        self.by_tag.get(&tag)
    }

    /// Looks up the descriptor for a message kind.
    pub fn by_kind(&self, kind: MessageKind) -> Option<&VariantDescriptor> {
        self.by_kind.get(&kind)
    }

    /// Number of registered variants.
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

// ── Process-wide registry ─────────────────────────────────────────────────────

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Returns the process-wide registry built from [`CATALOG`].
///
/// Built lazily on first use. The built-in catalog is validated by tests, so
/// a failure here means the binary itself is inconsistent; it is the one
/// startup condition this crate treats as fatal.
pub fn registry() -> &'static TypeRegistry {
    REGISTRY.get_or_init(|| {
        let registry = TypeRegistry::from_catalog(&CATALOG)
            .expect("built-in message catalog has unique tags and kinds");
        debug!(variants = registry.len(), "type registry initialized");
        registry
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

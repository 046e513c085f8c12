//! # lanlink-core
//!
//! Shared wire protocol for LanLink: the closed message catalog, the tag
//! registry, the JSON codec, and length-prefixed framing.
//!
//! This crate is used by every LanLink endpoint. It has no dependency on an
//! async runtime or on sockets; everything here is a pure function over byte
//! slices and values, which keeps the protocol testable in isolation.
//!
//! # How a message travels (for beginners)
//!
//! An application value like `Message::Ack(AckMessage { token: 7 })` goes
//! through three layers on its way to the wire:
//!
//! ```text
//! Message::Ack(..)                      typed Rust value
//!   │  encode_message
//!   ▼
//! {"token":7,"type":2}                  JSON document, tag injected
//!   │  encode_frame
//!   ▼
//! [00 00 00 14] {"token":7,"type":2}    4-byte big-endian length + payload
//! ```
//!
//! Decoding runs the same path backwards: parse the document, read the
//! reserved `"type"` field, look the tag up in the [`protocol::registry`],
//! and deserialize the remaining fields into the matching variant. A tag
//! nobody registered fails the whole call; there are no partial decodes.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `lanlink_core::Message` instead of `lanlink_core::protocol::messages::Message`.
pub use protocol::codec::{decode_message, encode_frame, encode_message, CodecError};
pub use protocol::messages::{Message, MessageKind, FRAME_HEADER_SIZE};
pub use protocol::registry::{registry, RegistryError, TypeRegistry, VariantDescriptor};

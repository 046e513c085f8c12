//! Protocol module containing the message catalog, type registry, and codec.

pub mod codec;
pub mod messages;
pub mod registry;

pub use codec::{decode_message, encode_frame, encode_message, CodecError};
pub use messages::*;
pub use registry::{registry, RegistryError, TypeRegistry, VariantDescriptor};

//! Domain layer: immutable configuration values and the pure half of the
//! certificate trust policy.

pub mod config;
pub mod trust;

pub use config::{DiscoveryConfig, SessionConfig};
pub use trust::FingerprintSet;

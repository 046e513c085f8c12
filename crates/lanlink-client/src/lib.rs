//! lanlink-client library crate.
//!
//! This crate is the connecting side of the LanLink fabric: it opens a
//! certificate-pinned TLS session to a peer, exchanges framed protocol
//! messages, and discovers peers on the local network segment via UDP
//! broadcast.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Application callbacks (response / error / discovery handlers)
//!         ↕
//! [lanlink-client]
//!   ├── domain/           Pure types: SessionConfig, DiscoveryConfig,
//!   │                     FingerprintSet (digest matching, no I/O)
//!   └── infrastructure/
//!         ├── tls/        rustls verifier enforcing the pinning policy
//!         ├── session/    TLS connect, framed send, receive-loop task
//!         └── discovery/  UDP broadcast request + bounded-timeout replies
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies beyond digest primitives (no I/O,
//!   no async, no sockets).
//! - `infrastructure` depends on `domain`, `lanlink-core`, `tokio`, and
//!   `tokio-rustls`.
//!
//! # A note on failure reporting
//!
//! Almost nothing in this crate returns an error to the caller directly.
//! Once a session is running, failures are classified by phase and delivered
//! to the [`infrastructure::handlers::ErrorHandler`] supplied at
//! construction, so the application has one place to decide about
//! reconnecting, logging, or giving up. The exception is
//! [`infrastructure::session::Session::start`], whose failure means there is
//! no session to keep alive.

/// Domain layer: pure configuration and trust-policy types (no I/O).
pub mod domain;

/// Infrastructure layer: TLS session transport and UDP discovery.
pub mod infrastructure;

pub use domain::config::{DiscoveryConfig, SessionConfig};
pub use domain::trust::FingerprintSet;
pub use infrastructure::discovery::{DiscoveryAgent, DiscoveryError};
pub use infrastructure::handlers::{DiscoveryHandler, ErrorHandler, FailurePhase, ResponseHandler};
pub use infrastructure::session::{Session, SessionError, SessionState};

//! Infrastructure layer: everything that touches a socket.
//!
//! - `handlers` — the async callback contracts the application implements.
//! - `tls` — rustls verifier enforcing the fingerprint-pinning policy.
//! - `session` — pinned-TLS stream transport with a framed receive loop.
//! - `discovery` — UDP broadcast request and bounded-timeout reply loop.

pub mod discovery;
pub mod handlers;
pub mod session;
pub mod tls;

pub use discovery::{DiscoveryAgent, DiscoveryError};
pub use handlers::{DiscoveryHandler, ErrorHandler, FailurePhase, ResponseHandler};
pub use session::{Session, SessionError, SessionState};

//! Callback contracts between the transport layer and the application.
//!
//! The session and discovery loops never return errors to the caller once
//! running; every recoverable failure is funneled through [`ErrorHandler`]
//! together with a [`FailurePhase`] describing where it happened. Inbound
//! traffic is delivered through [`ResponseHandler`] (TCP session) and
//! [`DiscoveryHandler`] (UDP discovery).
//!
//! All handlers are shared as `Arc<dyn ...>` and invoked from spawned tasks,
//! so implementations must be `Send + Sync`.

use std::net::SocketAddr;

use async_trait::async_trait;
use lanlink_core::protocol::messages::Message;

use super::session::Session;

/// Identifies the operation during which a reported failure occurred.
///
/// Handlers receive this alongside the error so they can react differently to,
/// say, a failed send (retry later) versus a failed disconnect (log and move on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePhase {
    /// Closing the session transport failed.
    Disconnect,
    /// Encoding or writing an outbound message failed.
    Send,
    /// Reading or decoding an inbound frame failed.
    Receive,
    /// Cancelling a discovery run failed.
    UdpCancel,
    /// The discovery socket failed while waiting for replies.
    UdpDiscovering,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailurePhase::Disconnect => "disconnect",
            FailurePhase::Send => "send",
            FailurePhase::Receive => "receive",
            FailurePhase::UdpCancel => "udp_cancel",
            FailurePhase::UdpDiscovering => "udp_discovering",
        };
        f.write_str(name)
    }
}

/// Trait for consuming messages received over an established session.
///
/// The session hands over the decoded message together with a reference to
/// itself, so the handler can reply on the same connection.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Called once per successfully decoded inbound message, in arrival order.
    async fn on_response(&self, session: &Session, message: Message);
}

/// Trait for observing recoverable failures.
///
/// Infrastructure reports here instead of returning errors; test
/// implementations record the calls for assertions.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Called when an operation fails without tearing down its owner.
    async fn on_error(&self, error: anyhow::Error, phase: FailurePhase);
}

/// Trait for consuming replies to a discovery broadcast.
#[async_trait]
pub trait DiscoveryHandler: Send + Sync {
    /// Called once per decoded reply, with the address it arrived from.
    async fn on_discovered(&self, message: Message, sender: SocketAddr);

    /// Called exactly once when the reply window elapses without further
    /// replies. Not called when the run aborts on a socket error.
    async fn on_finish(&self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

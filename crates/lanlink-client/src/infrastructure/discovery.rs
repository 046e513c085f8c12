//! UDP broadcast discovery of peers on the local segment.
//!
//! One [`DiscoveryAgent`] performs one run: broadcast a single request
//! datagram, then collect unicast replies until a receive attempt times out.
//!
//! ```text
//! agent                         peers on the segment
//!   │  request ──▶ broadcast:port ──▶ (everyone)
//!   │◀── reply (unicast) ── peer A
//!   │◀── reply (unicast) ── peer B
//!   │   ... reply_timeout elapses with no further reply ...
//!   └─ on_finish()
//! ```
//!
//! The first timeout is the normal end of a run, not a failure; it is how the
//! agent decides everyone who is going to answer has answered. Socket errors
//! abort the run through the [`ErrorHandler`] instead, and the finish callback
//! does not fire in that case. Replies that fail to decode are skipped — a
//! broadcast port sees whatever the segment throws at it, and junk from an
//! unrelated program must not end the run early.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use lanlink_core::protocol::codec::{decode_message, encode_message, CodecError};
use lanlink_core::protocol::messages::MessageKind;
use lanlink_core::protocol::registry::registry;

use crate::domain::config::DiscoveryConfig;
use crate::infrastructure::handlers::{DiscoveryHandler, ErrorHandler, FailurePhase};

/// Largest reply datagram a run will accept. Replies are single small JSON
/// documents; anything bigger is not ours.
const MAX_DATAGRAM_SIZE: usize = 2048;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that abort a discovery run.
///
/// None of these are returned to the caller; [`DiscoveryAgent::run`] reports
/// them through the error handler with [`FailurePhase::UdpDiscovering`].
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind the discovery socket")]
    Bind {
        #[source]
        source: std::io::Error,
    },

    /// The configured request variant cannot be built from an endpoint.
    #[error("message kind {kind:?} has no registered endpoint factory")]
    NoEndpointFactory { kind: MessageKind },

    #[error("failed to encode the discovery request")]
    Encode {
        #[source]
        source: CodecError,
    },

    #[error("failed to broadcast the discovery request to {addr}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The socket failed while waiting for replies.
    #[error("failed to receive a discovery reply")]
    Receive {
        #[source]
        source: std::io::Error,
    },
}

// ── Broadcast address selection ───────────────────────────────────────────────

/// First non-loopback IPv4 interface's subnet broadcast address, if any.
fn subnet_broadcast_addr() -> Option<Ipv4Addr> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    interfaces.into_iter().find_map(|interface| {
        if interface.is_loopback() {
            return None;
        }
        match interface.addr {
            if_addrs::IfAddr::V4(v4) => v4.broadcast,
            if_addrs::IfAddr::V6(_) => None,
        }
    })
}

/// Destination for the request datagram: configured override first, then the
/// subnet broadcast address, then the limited broadcast address.
fn resolve_broadcast_addr(config: &DiscoveryConfig) -> Ipv4Addr {
    config
        .broadcast_addr
        .or_else(subnet_broadcast_addr)
        .unwrap_or(Ipv4Addr::BROADCAST)
}

// ── DiscoveryAgent ────────────────────────────────────────────────────────────

/// One broadcast-then-collect discovery run.
///
/// Built from an immutable config and consumed by [`run`](Self::run); a new
/// run needs a new agent. There is no external cancellation — a run ends on
/// its first receive timeout or on a socket error.
pub struct DiscoveryAgent {
    config: DiscoveryConfig,
    discovery_handler: Arc<dyn DiscoveryHandler>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl DiscoveryAgent {
    pub fn new(
        config: DiscoveryConfig,
        discovery_handler: Arc<dyn DiscoveryHandler>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            config,
            discovery_handler,
            error_handler,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Runs the agent to completion on a spawned task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Broadcasts one request, then reports replies until the first timeout.
    ///
    /// Every reply is delivered through the discovery handler before the next
    /// receive attempt starts, so `on_discovered` calls from one run never
    /// overlap. A clean run ends with exactly one `on_finish`; an aborted run
    /// ends with exactly one error report and no `on_finish`.
    pub async fn run(self) {
        if let Err(error) = self.run_inner().await {
            warn!(error = %error, "discovery run aborted");
            self.error_handler
                .on_error(anyhow::Error::new(error), FailurePhase::UdpDiscovering)
                .await;
        }
    }

    async fn run_inner(&self) -> Result<(), DiscoveryError> {
        let factory = registry()
            .by_kind(self.config.message_kind)
            .and_then(|descriptor| descriptor.endpoint_factory)
            .ok_or(DiscoveryError::NoEndpointFactory {
                kind: self.config.message_kind,
            })?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|source| DiscoveryError::Bind { source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| DiscoveryError::Bind { source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| DiscoveryError::Bind { source })?;

        let request = factory(local_addr);
        let payload = encode_message(&request).map_err(|source| DiscoveryError::Encode { source })?;

        let target = SocketAddr::from((resolve_broadcast_addr(&self.config), self.config.port));
        socket
            .send_to(&payload, target)
            .await
            .map_err(|source| DiscoveryError::Send {
                addr: target,
                source,
            })?;
        info!(
            %target,
            kind = ?self.config.message_kind,
            reply_timeout = ?self.config.reply_timeout,
            "discovery request broadcast"
        );

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, sender) = match timeout(self.config.reply_timeout, socket.recv_from(&mut buf))
                .await
            {
                Ok(Ok(received)) => received,
                Ok(Err(source)) => return Err(DiscoveryError::Receive { source }),
                Err(_elapsed) => {
                    debug!("reply window elapsed, discovery finished");
                    self.discovery_handler.on_finish().await;
                    return Ok(());
                }
            };

            match decode_message(&buf[..len]) {
                Ok(message) if message.kind() == self.config.message_kind => {
                    debug!(%sender, bytes = len, "discovered a peer");
                    self.discovery_handler.on_discovered(message, sender).await;
                }
                Ok(message) => {
                    // Some other LanLink traffic strayed onto our ephemeral
                    // port; not a reply, keep waiting.
                    debug!(%sender, kind = ?message.kind(), "ignoring non-reply datagram");
                }
                Err(error) => {
                    debug!(%sender, error = %error, "skipping malformed datagram");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

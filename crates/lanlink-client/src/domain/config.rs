//! Session and discovery configuration values.
//!
//! Both configs are plain immutable values: build one with `new`, refine it
//! with the consuming `with_*` methods, then hand it to the session or agent.
//! Nothing mutates a config after construction, so a config captured by a
//! running task always describes what that task is actually doing.

use std::net::Ipv4Addr;
use std::time::Duration;

use lanlink_core::MessageKind;

use crate::domain::trust::FingerprintSet;

/// Everything a [`crate::infrastructure::session::Session`] needs to reach
/// and trust one peer.
///
/// # Example
///
/// ```rust
/// use lanlink_client::domain::config::SessionConfig;
/// use lanlink_client::domain::trust::FingerprintSet;
/// use std::time::Duration;
///
/// let cfg = SessionConfig::new("192.168.1.20", 9300)
///     .with_fingerprints(FingerprintSet::accept_all())
///     .with_connect_timeout(Duration::from_secs(5));
/// assert_eq!(cfg.port, 9300);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hostname or IP address of the peer.
    pub host: String,

    /// TCP port the peer's TLS listener is bound to.
    pub port: u16,

    /// Certificate digests this session will trust.
    ///
    /// Defaults to an empty pinned set, which trusts nothing: a session is
    /// only usable once the caller has pinned at least one fingerprint or
    /// explicitly opted into accept-all.
    pub fingerprints: FingerprintSet,

    /// Upper bound on the TCP connect preceding the TLS handshake.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Builds a config for the given endpoint with default trust (nothing
    /// pinned) and a 10 second connect timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            fingerprints: FingerprintSet::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Replaces the trusted fingerprint set.
    pub fn with_fingerprints(mut self, fingerprints: FingerprintSet) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    /// Replaces the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Everything a [`crate::infrastructure::discovery::DiscoveryAgent`] needs
/// for one broadcast run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port peers listen for discovery requests on; replies are expected
    /// unicast back to the agent's own socket.
    pub port: u16,

    /// Which message variant carries both the request and the replies. The
    /// variant must have an endpoint factory registered in the catalog.
    pub message_kind: MessageKind,

    /// How long each individual receive attempt waits before the run is
    /// considered finished.
    pub reply_timeout: Duration,

    /// Overrides the destination broadcast address. `None` selects the first
    /// non-loopback interface's subnet broadcast address, falling back to
    /// the limited broadcast address. Tests point this at loopback to keep
    /// discovery traffic off the real network.
    pub broadcast_addr: Option<Ipv4Addr>,
}

impl DiscoveryConfig {
    /// Builds a config for the given port and request variant with the
    /// default 2500 ms per-attempt reply timeout.
    pub fn new(port: u16, message_kind: MessageKind) -> Self {
        Self {
            port,
            message_kind,
            reply_timeout: Duration::from_millis(2500),
            broadcast_addr: None,
        }
    }

    /// Replaces the per-attempt reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Pins the destination broadcast address instead of deriving it from
    /// the local interfaces.
    pub fn with_broadcast_addr(mut self, addr: Ipv4Addr) -> Self {
        self.broadcast_addr = Some(addr);
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

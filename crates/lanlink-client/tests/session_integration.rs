//! Integration tests for the pinned-TLS session over a loopback listener.
//!
//! # Purpose
//!
//! These tests exercise [`Session`] through its public API the way an
//! application does, against a real TLS listener on `127.0.0.1`. They verify:
//!
//! - The happy path: a handshake against a pinned certificate succeeds and
//!   framed messages flow in both directions in arrival order.
//! - The trust policy end-to-end: a server whose certificate digest is not in
//!   the pinned set fails `start()`, and accept-all admits any valid
//!   certificate.
//! - Lifecycle edges: `close()` is idempotent, `send()` after `close()`
//!   reports through the error handler instead of crashing, and a peer that
//!   disappears closes the session silently.
//! - The single-writer guarantee: frames from concurrent `send()` calls
//!   arrive contiguous and well-formed on the wire.
//!
//! # Test server
//!
//! Each test starts its own listener on port 0 with a fresh self-signed
//! certificate, so tests are independent and never race over a port. The
//! server side speaks the same framing by hand (4-byte big-endian length,
//! then the JSON payload), which doubles as a check that the session's wire
//! output matches the protocol contract and not merely its own reader.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use async_trait::async_trait;
use rcgen::{CertificateParams, KeyPair};

use lanlink_core::protocol::codec::{decode_message, encode_frame};
use lanlink_core::protocol::messages::{AckMessage, EventMessage, HelloMessage, Message};
use lanlink_client::domain::config::SessionConfig;
use lanlink_client::domain::trust::FingerprintSet;
use lanlink_client::infrastructure::handlers::{ErrorHandler, FailurePhase, ResponseHandler};
use lanlink_client::infrastructure::session::{Session, SessionError, SessionState};

/// Upper bound on any single await in these tests; generous so slow CI does
/// not flake, tight enough that a hang fails fast.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Opt-in log output: `RUST_LOG=lanlink_client=debug cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Server fixture ────────────────────────────────────────────────────────────

/// A loopback TLS listener with a fresh self-signed identity.
struct TlsServer {
    addr: SocketAddr,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    /// Uppercase-hex SHA-256 digest of the server certificate.
    fingerprint: String,
}

impl TlsServer {
    async fn start() -> Self {
        let key = KeyPair::generate().expect("generate server key");
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .expect("certificate params")
            .self_signed(&key)
            .expect("self-sign server certificate");
        let cert_der: CertificateDer<'static> = cert.der().clone();
        let fingerprint = FingerprintSet::fingerprint(cert_der.as_ref());

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![cert_der],
                PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
            )
            .expect("server TLS config");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("listener address");

        Self {
            addr,
            listener,
            acceptor: TlsAcceptor::from(Arc::new(config)),
            fingerprint,
        }
    }

    /// Accepts one connection and completes the server side of the handshake.
    async fn accept(&self) -> tokio_rustls::server::TlsStream<TcpStream> {
        let (tcp, _peer) = self.listener.accept().await.expect("accept connection");
        self.acceptor.accept(tcp).await.expect("server handshake")
    }

    /// A session config pointing at this server with its certificate pinned.
    fn pinned_config(&self) -> SessionConfig {
        SessionConfig::new("localhost", self.addr.port())
            .with_fingerprints(FingerprintSet::pinned([self.fingerprint.clone()]))
    }
}

/// Reads one length-prefixed frame from the server side of a stream.
async fn read_frame<S: AsyncReadExt + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.expect("read frame header");
    let len = u32::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.expect("read frame payload");
    payload
}

// ── Handler fixtures ──────────────────────────────────────────────────────────

/// Forwards every decoded inbound message to a channel for assertions.
struct ChannelResponseHandler {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl ResponseHandler for ChannelResponseHandler {
    async fn on_response(&self, _session: &Session, message: Message) {
        self.tx.send(message).expect("test receiver alive");
    }
}

#[derive(Default)]
struct RecordingErrorHandler {
    reports: Mutex<Vec<(String, FailurePhase)>>,
}

impl RecordingErrorHandler {
    fn phases(&self) -> Vec<FailurePhase> {
        self.reports.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }
}

#[async_trait]
impl ErrorHandler for RecordingErrorHandler {
    async fn on_error(&self, error: anyhow::Error, phase: FailurePhase) {
        self.reports.lock().unwrap().push((error.to_string(), phase));
    }
}

struct Fixture {
    session: Session,
    responses: mpsc::UnboundedReceiver<Message>,
    errors: Arc<RecordingErrorHandler>,
}

fn build_session(config: SessionConfig) -> Fixture {
    init_tracing();
    let (tx, responses) = mpsc::unbounded_channel();
    let errors = Arc::new(RecordingErrorHandler::default());
    let session = Session::new(
        config,
        Arc::new(ChannelResponseHandler { tx }),
        Arc::clone(&errors) as Arc<dyn ErrorHandler>,
    );
    Fixture {
        session,
        responses,
        errors,
    }
}

// ── Handshake and trust policy ────────────────────────────────────────────────

/// The complete happy path: pinned handshake, one frame out, one frame in.
#[tokio::test(flavor = "multi_thread")]
async fn test_pinned_handshake_and_bidirectional_exchange() {
    // Arrange
    let server = TlsServer::start().await;
    let mut fixture = build_session(server.pinned_config());

    let accept = tokio::spawn(async move {
        let mut stream = server.accept().await;

        // Server receives the client's hello...
        let payload = read_frame(&mut stream).await;
        let inbound = decode_message(&payload).expect("decode client frame");

        // ...and answers with an ack.
        let reply = encode_frame(&Message::Ack(AckMessage { token: 42 })).expect("encode reply");
        stream.write_all(&reply).await.expect("write reply");
        inbound
    });

    // Act
    fixture.session.start().await.expect("pinned handshake succeeds");
    assert_eq!(fixture.session.state(), SessionState::Connected);
    fixture
        .session
        .send(&Message::Hello(HelloMessage {
            peer_name: "itest".to_string(),
            protocol_version: 1,
        }))
        .await;

    // Assert: both directions carried the exact messages.
    let inbound = timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
    assert_eq!(
        inbound,
        Message::Hello(HelloMessage {
            peer_name: "itest".to_string(),
            protocol_version: 1,
        })
    );
    let reply = timeout(TEST_TIMEOUT, fixture.responses.recv())
        .await
        .expect("reply in time")
        .expect("reply delivered");
    assert_eq!(reply, Message::Ack(AckMessage { token: 42 }));
    assert!(fixture.errors.phases().is_empty());
}

/// A server certificate outside the pinned set must fail `start()`.
#[tokio::test(flavor = "multi_thread")]
async fn test_unpinned_server_fails_the_handshake() {
    // Arrange: pin a digest that is not the server's.
    let server = TlsServer::start().await;
    let config = SessionConfig::new("localhost", server.addr.port())
        .with_fingerprints(FingerprintSet::pinned([format!("{:064}", 0)]));
    let fixture = build_session(config);

    // The server side of a rejected handshake errors; that is expected here.
    let accept = tokio::spawn(async move {
        let (tcp, _peer) = server.listener.accept().await.expect("accept");
        let _ = server.acceptor.accept(tcp).await;
    });

    // Act
    let result = fixture.session.start().await;

    // Assert: handshake error, session terminally closed.
    assert!(matches!(result, Err(SessionError::Handshake { .. })));
    assert_eq!(fixture.session.state(), SessionState::Closed);
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
}

/// Accept-all admits a certificate no digest was pinned for.
#[tokio::test(flavor = "multi_thread")]
async fn test_accept_all_admits_any_valid_certificate() {
    // Arrange
    let server = TlsServer::start().await;
    let config = SessionConfig::new("localhost", server.addr.port())
        .with_fingerprints(FingerprintSet::accept_all());
    let fixture = build_session(config);

    let accept = tokio::spawn(async move {
        let _stream = server.accept().await;
    });

    // Act + Assert
    fixture.session.start().await.expect("accept-all handshake succeeds");
    assert!(fixture.session.is_connected());
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
}

// ── Lifecycle edges ───────────────────────────────────────────────────────────

/// Closing twice is a no-op the second time; neither close reports an error.
#[tokio::test(flavor = "multi_thread")]
async fn test_close_is_idempotent_on_a_connected_session() {
    // Arrange
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());
    let accept = tokio::spawn(async move {
        let mut stream = server.accept().await;
        // Hold the connection open until the client is done closing.
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });
    fixture.session.start().await.expect("handshake");

    // Act
    fixture.session.close().await;
    fixture.session.close().await;

    // Assert
    assert_eq!(fixture.session.state(), SessionState::Closed);
    assert!(fixture.errors.phases().is_empty());
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
}

/// `send()` on a closed session reports a send-phase error, never panics.
#[tokio::test(flavor = "multi_thread")]
async fn test_send_after_close_reports_send_error() {
    // Arrange
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());
    let accept = tokio::spawn(async move {
        let mut stream = server.accept().await;
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });
    fixture.session.start().await.expect("handshake");
    fixture.session.close().await;

    // Act
    fixture
        .session
        .send(&Message::Ack(AckMessage { token: 1 }))
        .await;

    // Assert
    assert_eq!(fixture.errors.phases(), vec![FailurePhase::Send]);
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
}

/// A peer that closes the connection ends the session silently: no error
/// report, state `Closed`.
#[tokio::test(flavor = "multi_thread")]
async fn test_peer_eof_closes_the_session_silently() {
    // Arrange
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());
    let accept = tokio::spawn(async move {
        let mut stream = server.accept().await;
        stream.shutdown().await.expect("server-side shutdown");
    });
    fixture.session.start().await.expect("handshake");
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();

    // Act: wait for the receive loop to observe the EOF.
    timeout(TEST_TIMEOUT, async {
        while fixture.session.state() != SessionState::Closed {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session observes peer EOF");

    // Assert: graceful closure is not an error.
    assert!(fixture.errors.phases().is_empty());
}

/// `start()` on a session that already started fails without touching the
/// live connection.
#[tokio::test(flavor = "multi_thread")]
async fn test_second_start_is_rejected() {
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());
    let accept = tokio::spawn(async move {
        let mut stream = server.accept().await;
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf).await;
    });
    fixture.session.start().await.expect("first start");

    let result = fixture.session.start().await;

    assert!(matches!(result, Err(SessionError::NotStartable)));
    assert!(fixture.session.is_connected());
    fixture.session.close().await;
    timeout(TEST_TIMEOUT, accept).await.expect("server in time").unwrap();
}

// ── Wire-level properties ─────────────────────────────────────────────────────

/// Frames from many concurrent senders arrive contiguous: every frame on the
/// wire decodes, and all of them arrive.
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sends_never_interleave_frames() {
    const SENDERS: usize = 8;
    const MESSAGES_PER_SENDER: usize = 25;

    // Arrange: the server reads raw frames and decodes each one itself, so
    // any interleaving shows up as a length-prefix pointing into garbage.
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());
    let reader = tokio::spawn(async move {
        let mut stream = server.accept().await;
        let mut topics = Vec::with_capacity(SENDERS * MESSAGES_PER_SENDER);
        for _ in 0..SENDERS * MESSAGES_PER_SENDER {
            let payload = read_frame(&mut stream).await;
            match decode_message(&payload).expect("every frame decodes cleanly") {
                Message::Event(event) => topics.push(event.topic),
                other => panic!("unexpected message on the wire: {other:?}"),
            }
        }
        topics
    });
    fixture.session.start().await.expect("handshake");

    // Act: hammer the session from several tasks at once.
    let mut senders = Vec::new();
    for sender_id in 0..SENDERS {
        let session = fixture.session.clone();
        senders.push(tokio::spawn(async move {
            for seq in 0..MESSAGES_PER_SENDER {
                session
                    .send(&Message::Event(EventMessage {
                        topic: format!("sender-{sender_id}/{seq}"),
                        body: serde_json::json!({ "seq": seq }),
                    }))
                    .await;
            }
        }));
    }
    for sender in senders {
        sender.await.expect("sender task");
    }

    // Assert: every message arrived exactly once.
    let mut topics = timeout(TEST_TIMEOUT, reader).await.expect("reader in time").unwrap();
    topics.sort();
    assert_eq!(topics.len(), SENDERS * MESSAGES_PER_SENDER);
    topics.dedup();
    assert_eq!(topics.len(), SENDERS * MESSAGES_PER_SENDER);
    assert!(fixture.errors.phases().is_empty());
}

/// The latency probe answers in any session state and reports unreachable
/// peers as `None` instead of an error.
#[tokio::test(flavor = "multi_thread")]
async fn test_latency_probe_is_independent_of_session_state() {
    // Arrange: a listener that accepts but never speaks TLS is enough for a
    // TCP-level probe.
    let server = TlsServer::start().await;
    let fixture = build_session(server.pinned_config());

    // Act + Assert: reachable before start.
    let latency = fixture.session.probe_latency(TEST_TIMEOUT).await;
    assert!(latency.is_some());

    // Unreachable: a port with no listener answers `None` within the bound.
    let dead = build_session(SessionConfig::new("127.0.0.1", 1));
    let latency = dead.session.probe_latency(Duration::from_millis(500)).await;
    assert_eq!(latency, None);
}

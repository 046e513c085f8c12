//! Pinned-TLS session transport with a framed receive loop.
//!
//! A [`Session`] walks a one-way lifecycle:
//!
//! ```text
//! Created ──start()──▶ Connected ──close() / peer EOF──▶ Closed
//! ```
//!
//! `Closed` is terminal; a session is never reconnected, callers build a new
//! one instead. `start()` is the only operation that returns a `Result` —
//! after the handshake every failure is reported through the
//! [`ErrorHandler`] with the phase it occurred in, and `send()`/`close()`
//! always return to the caller.
//!
//! Outbound frames are assembled outside the writer lock and written with a
//! single `write_all`, so concurrent senders can never interleave bytes on
//! the wire. Inbound frames are read by a spawned loop that dispatches each
//! decoded message to the [`ResponseHandler`] in arrival order.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use lanlink_core::protocol::codec::{decode_message, encode_frame, CodecError};
use lanlink_core::protocol::messages::{Message, MessageKind, FRAME_HEADER_SIZE};

use crate::domain::config::SessionConfig;
use crate::infrastructure::handlers::{ErrorHandler, FailurePhase, ResponseHandler};
use crate::infrastructure::tls::pinned_client_config;

type ClientStream = TlsStream<TcpStream>;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised while establishing or using a session.
///
/// Only [`Session::start`] returns these directly. Everything after the
/// handshake is reported through the error handler instead of propagating.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start()` was called on a session that already left `Created`.
    #[error("session already started or closed")]
    NotStartable,

    /// The configured host is not a valid DNS name or IP address.
    #[error("invalid peer host: {host}")]
    InvalidHost { host: String },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to connect to {addr}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TLS handshake failed; certificate rejections by the pinning
    /// policy surface here.
    #[error("TLS handshake with {addr} failed")]
    Handshake {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The session is not in the `Connected` state.
    #[error("session is not connected")]
    NotConnected,

    /// Encoding or writing an outbound message failed.
    #[error("failed to send {kind:?} message")]
    Send {
        kind: MessageKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to read an inbound frame")]
    Receive {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode an inbound frame")]
    Decode {
        #[source]
        source: CodecError,
    },

    #[error("failed to close the connection cleanly")]
    Disconnect {
        #[source]
        source: std::io::Error,
    },
}

// ── State ─────────────────────────────────────────────────────────────────────

const STATE_CREATED: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not yet started.
    Created,
    /// Handshake complete, traffic may flow.
    Connected,
    /// Terminal. Reached through `close()`, peer EOF, or a failed `start()`.
    Closed,
}

fn state_from_raw(raw: u8) -> SessionState {
    match raw {
        STATE_CREATED => SessionState::Created,
        STATE_CONNECTED => SessionState::Connected,
        _ => SessionState::Closed,
    }
}

/// Write errors of these kinds mean the peer is gone rather than that the
/// operation itself is broken; the session closes quietly instead of
/// reporting them.
fn is_transport_gone(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof
    )
}

// ── Session ───────────────────────────────────────────────────────────────────

struct SessionInner {
    config: SessionConfig,
    state: AtomicU8,
    /// Write half of the TLS stream while connected. Taken on close so late
    /// senders observe `NotConnected` instead of racing the shutdown.
    writer: Mutex<Option<WriteHalf<ClientStream>>>,
    /// Wakes the receive loop when `close()` wins the race against a
    /// blocking read.
    close_signal: Notify,
    response_handler: Arc<dyn ResponseHandler>,
    error_handler: Arc<dyn ErrorHandler>,
}

/// One pinned-TLS connection to a peer.
///
/// Cheap to clone; clones share the underlying connection and state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Builds a session in the `Created` state. No I/O happens until
    /// [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        response_handler: Arc<dyn ResponseHandler>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                state: AtomicU8::new(STATE_CREATED),
                writer: Mutex::new(None),
                close_signal: Notify::new(),
                response_handler,
                error_handler,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        state_from_raw(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Connects, performs the pinned TLS handshake, and spawns the receive
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStartable`] if the session already left
    /// `Created`, and the connect/handshake errors otherwise. A failed start
    /// leaves the session `Closed`.
    pub async fn start(&self) -> Result<(), SessionError> {
        // Holding the writer lock across the handshake makes concurrent
        // start() calls queue up; the losers then fail the state check.
        let mut writer_slot = self.inner.writer.lock().await;
        if self.inner.state.load(Ordering::SeqCst) != STATE_CREATED {
            return Err(SessionError::NotStartable);
        }

        match self.connect().await {
            Ok(stream) => {
                let (read_half, write_half) = split(stream);
                *writer_slot = Some(write_half);
                self.inner.state.store(STATE_CONNECTED, Ordering::SeqCst);
                info!(
                    host = %self.inner.config.host,
                    port = self.inner.config.port,
                    "session connected"
                );

                let session = self.clone();
                tokio::spawn(async move { session.receive_loop(read_half).await });
                Ok(())
            }
            Err(error) => {
                self.inner.state.store(STATE_CLOSED, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    async fn connect(&self) -> Result<ClientStream, SessionError> {
        let config = &self.inner.config;
        let addr = format!("{}:{}", config.host, config.port);

        let server_name =
            ServerName::try_from(config.host.clone()).map_err(|_| SessionError::InvalidHost {
                host: config.host.clone(),
            })?;

        let tcp = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(SessionError::ConnectFailed { addr, source }),
            Err(_) => {
                return Err(SessionError::ConnectTimeout {
                    addr,
                    timeout: config.connect_timeout,
                })
            }
        };

        let connector = TlsConnector::from(pinned_client_config(config.fingerprints.clone()));
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| SessionError::Handshake { addr, source })
    }

    /// Encodes and writes one message.
    ///
    /// Failures are reported through the error handler with
    /// [`FailurePhase::Send`]; a send on a session that is not connected
    /// reports [`SessionError::NotConnected`] the same way. A write error
    /// that means the peer is simply gone closes the session quietly
    /// instead.
    pub async fn send(&self, message: &Message) {
        if self.inner.state.load(Ordering::SeqCst) != STATE_CONNECTED {
            self.report(FailurePhase::Send, SessionError::NotConnected)
                .await;
            return;
        }

        // Assemble the complete frame before taking the lock: the lock is
        // then held for exactly one write_all and frames never interleave.
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(source) => {
                self.report(
                    FailurePhase::Send,
                    SessionError::Send {
                        kind: message.kind(),
                        source: Box::new(source),
                    },
                )
                .await;
                return;
            }
        };

        let mut writer = self.inner.writer.lock().await;
        let Some(write_half) = writer.as_mut() else {
            drop(writer);
            self.report(FailurePhase::Send, SessionError::NotConnected)
                .await;
            return;
        };

        if let Err(source) = write_half.write_all(&frame).await {
            drop(writer);
            if is_transport_gone(source.kind()) {
                debug!("transport went away during send, closing quietly");
                self.close_silently().await;
            } else {
                self.report(
                    FailurePhase::Send,
                    SessionError::Send {
                        kind: message.kind(),
                        source: Box::new(source),
                    },
                )
                .await;
            }
            return;
        }

        debug!(kind = ?message.kind(), bytes = frame.len(), "sent frame");
    }

    /// Closes the session.
    ///
    /// Only a `Connected` session does anything here; calling `close()` on a
    /// `Created` or already-`Closed` session is a no-op, so callers may
    /// close unconditionally in cleanup paths. Shutdown errors are reported
    /// with [`FailurePhase::Disconnect`] unless the peer was already gone.
    pub async fn close(&self) {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_CONNECTED,
                STATE_CLOSED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        info!("closing session");
        // The permit is stored if the receive loop is not currently parked
        // on the signal, so the wakeup cannot be lost.
        self.inner.close_signal.notify_one();

        let write_half = self.inner.writer.lock().await.take();
        if let Some(mut write_half) = write_half {
            if let Err(source) = write_half.shutdown().await {
                if !is_transport_gone(source.kind()) {
                    self.report(FailurePhase::Disconnect, SessionError::Disconnect { source })
                        .await;
                }
            }
        }
    }

    /// Measures how long a plain TCP connect to the configured peer takes.
    ///
    /// Returns the elapsed time in milliseconds, or `None` when the peer
    /// does not accept within `probe_timeout`. Works in any session state
    /// and does not touch the session's own connection.
    pub async fn probe_latency(&self, probe_timeout: Duration) -> Option<u64> {
        let addr = format!("{}:{}", self.inner.config.host, self.inner.config.port);
        let started = Instant::now();
        match timeout(probe_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Some(started.elapsed().as_millis() as u64),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    // ── Receive loop ──────────────────────────────────────────────────────────

    async fn receive_loop(self, mut read_half: ReadHalf<ClientStream>) {
        debug!("receive loop started");
        loop {
            if self.state() != SessionState::Connected {
                break;
            }

            let frame = tokio::select! {
                result = Self::read_frame(&mut read_half) => result,
                _ = self.inner.close_signal.notified() => break,
            };

            match frame {
                Ok(Some(payload)) => match decode_message(&payload) {
                    Ok(message) => {
                        debug!(kind = ?message.kind(), bytes = payload.len(), "received frame");
                        self.inner.response_handler.on_response(&self, message).await;
                    }
                    Err(source) => {
                        // A frame we cannot decode does not invalidate the
                        // stream: framing is still intact, keep reading.
                        self.report(FailurePhase::Receive, SessionError::Decode { source })
                            .await;
                    }
                },
                Ok(None) => {
                    debug!("peer closed the connection");
                    self.close_silently().await;
                    break;
                }
                Err(source) if is_transport_gone(source.kind()) => {
                    debug!("transport went away, closing quietly");
                    self.close_silently().await;
                    break;
                }
                Err(source) => {
                    self.report(FailurePhase::Receive, SessionError::Receive { source })
                        .await;
                    self.close_silently().await;
                    break;
                }
            }
        }
        debug!("receive loop finished");
    }

    /// Reads one length-prefixed frame. `Ok(None)` means the peer shut down
    /// cleanly at a frame boundary.
    async fn read_frame(
        read_half: &mut ReadHalf<ClientStream>,
    ) -> std::io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        match read_half.read_exact(&mut header).await {
            Ok(_) => {}
            Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error),
        }

        let len = u32::from_be_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        read_half.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }

    /// Transitions to `Closed` without reporting anything: used when the
    /// peer is gone and there is nothing actionable to tell the caller.
    async fn close_silently(&self) {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_CONNECTED,
                STATE_CLOSED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        info!("session closed");
        if let Some(mut write_half) = self.inner.writer.lock().await.take() {
            // Best effort, the transport is already going away.
            let _ = write_half.shutdown().await;
        }
    }

    async fn report(&self, phase: FailurePhase, error: SessionError) {
        warn!(%phase, error = %error, "session error");
        self.inner
            .error_handler
            .on_error(anyhow::Error::new(error), phase)
            .await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

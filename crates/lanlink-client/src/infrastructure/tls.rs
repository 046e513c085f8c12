//! Certificate verification for pinned sessions.
//!
//! The verifier replaces WebPKI chain building entirely: there is no root
//! store and no hostname check. Every certificate the server presents must
//! be inside its validity period, and, unless the policy is
//! [`FingerprintSet::accept_all`], its SHA-256 digest must be pinned. One
//! failing certificate rejects the whole handshake.
//!
//! Client certificates are never requested, so the config built here
//! performs no client authentication.

use std::sync::Arc;

use tokio_rustls::rustls::{
    self,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{ring, verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms},
    pki_types::{CertificateDer, ServerName, UnixTime},
    CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme,
};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::domain::trust::FingerprintSet;

/// A [`ServerCertVerifier`] that trusts by digest instead of by chain.
///
/// Signature verification still uses the provider's real algorithms; only
/// the trust decision is replaced.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    fingerprints: FingerprintSet,
    supported: WebPkiSupportedAlgorithms,
}

impl PinnedServerVerifier {
    pub fn new(fingerprints: FingerprintSet) -> Self {
        Self {
            fingerprints,
            supported: ring::default_provider().signature_verification_algorithms,
        }
    }

    /// Checks one certificate: parseable, inside its validity period, and
    /// digest-trusted.
    fn check_certificate(
        &self,
        der: &CertificateDer<'_>,
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        let (_, parsed) = X509Certificate::from_der(der.as_ref())
            .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;

        let now_secs = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);
        let validity = parsed.validity();
        if now_secs < validity.not_before.timestamp() {
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidYet,
            ));
        }
        if now_secs > validity.not_after.timestamp() {
            return Err(rustls::Error::InvalidCertificate(CertificateError::Expired));
        }

        if !self.fingerprints.matches(der.as_ref()) {
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        }
        Ok(())
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.check_certificate(end_entity, now)?;
        for intermediate in intermediates {
            self.check_certificate(intermediate, now)?;
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.supported)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.supported)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported.supported_schemes()
    }
}

/// Builds a client TLS config that verifies peers against `fingerprints`
/// and offers no client certificate.
pub fn pinned_client_config(fingerprints: FingerprintSet) -> Arc<ClientConfig> {
    let verifier = Arc::new(PinnedServerVerifier::new(fingerprints));
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Arc::new(config)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

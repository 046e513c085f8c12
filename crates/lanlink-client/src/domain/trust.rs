//! The pure half of the certificate trust policy: which digests we accept.
//!
//! A peer certificate is identified by the SHA-256 digest of its DER
//! encoding, hex-encoded uppercase (the format `openssl x509 -fingerprint
//! -sha256` prints, minus the colons). Validity-period checks and handshake
//! wiring live in the infrastructure layer; this type only answers "is this
//! certificate one of ours".

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// The set of certificate digests a session trusts.
///
/// `AcceptAll` replaces the original wire format's magic `"all"` entry: it
/// skips digest matching entirely (validity periods are still enforced by
/// the verifier). The default is an empty pinned set, which trusts nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintSet {
    /// Trust any certificate that passes validity-period checks.
    AcceptAll,
    /// Trust only certificates whose digest appears in the set.
    Pinned(HashSet<String>),
}

impl FingerprintSet {
    /// A set that matches every certificate.
    pub fn accept_all() -> Self {
        FingerprintSet::AcceptAll
    }

    /// A pinned set built from hex digests.
    ///
    /// Entries are normalized: surrounding whitespace trimmed, `:`
    /// separators stripped, letters uppercased. `AB:CD:..`, `abcd..`, and
    /// `ABCD..` all pin the same certificate.
    pub fn pinned<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FingerprintSet::Pinned(
            digests
                .into_iter()
                .map(|digest| normalize(digest.as_ref()))
                .collect(),
        )
    }

    pub fn is_accept_all(&self) -> bool {
        matches!(self, FingerprintSet::AcceptAll)
    }

    /// Whether a certificate, given as its DER encoding, is trusted.
    pub fn matches(&self, der: &[u8]) -> bool {
        match self {
            FingerprintSet::AcceptAll => true,
            FingerprintSet::Pinned(set) => set.contains(&Self::fingerprint(der)),
        }
    }

    /// Whether a digest string is in the set, after normalization.
    pub fn contains(&self, digest: &str) -> bool {
        match self {
            FingerprintSet::AcceptAll => true,
            FingerprintSet::Pinned(set) => set.contains(&normalize(digest)),
        }
    }

    /// SHA-256 digest of a DER certificate, hex-encoded uppercase.
    pub fn fingerprint(der: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(der))
    }
}

impl Default for FingerprintSet {
    fn default() -> Self {
        FingerprintSet::Pinned(HashSet::new())
    }
}

fn normalize(digest: &str) -> String {
    digest.trim().replace(':', "").to_ascii_uppercase()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

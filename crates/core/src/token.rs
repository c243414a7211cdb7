//! Upload capability tokens.
//!
//! Each upload session is guarded by a bearer token handed out exactly once,
//! in the init response. The server keeps only a SHA-256 fingerprint;
//! verification compares fingerprints, so the comparison cost does not
//! depend on how much of the presented value matches.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of random bytes backing a token (hex-encoded to 64 chars).
const TOKEN_BYTES: usize = 32;

/// A freshly generated upload token.
///
/// The raw value is revealed once to the client and must not appear in
/// logs or snapshots afterwards.
#[derive(Clone)]
pub struct UploadToken(String);

impl UploadToken {
    /// Generate a new random token.
    pub fn generate() -> Self {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        Self(hex_encode(&buf))
    }

    /// The raw token value, for the init response.
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Fingerprint for server-side storage.
    pub fn fingerprint(&self) -> TokenFingerprint {
        TokenFingerprint::of(&self.0)
    }
}

impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadToken(..)")
    }
}

/// SHA-256 fingerprint of an upload token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TokenFingerprint([u8; 32]);

impl TokenFingerprint {
    /// Fingerprint an arbitrary token value.
    pub fn of(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Check a presented token value against this fingerprint.
    pub fn matches(&self, presented: &str) -> bool {
        Self::of(presented).0 == self.0
    }
}

impl fmt::Debug for TokenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenFingerprint(..)")
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

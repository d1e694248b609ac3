//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! OAuth 2.1-style clients mandate PKCE with the S256 code challenge method
//! for every authorization-code flow; this module generates the verifier
//! client-side and computes/verifies the challenge.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// A single-use PKCE verifier/challenge pair generated for one authorization
/// attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a new verifier/challenge pair.
    ///
    /// The verifier is 64 raw random bytes, base64url-encoded without
    /// padding (86 characters, well within the RFC 7636 43-128 bound). The
    /// challenge is `BASE64URL(SHA-256(verifier))` with method `S256`.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = base64_url::encode(&bytes);
        let challenge = challenge_for(&verifier);
        Self { verifier, challenge }
    }
}

/// Compute the S256 code challenge for a given verifier.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64_url::encode(&hasher.finalize())
}

/// Verify a presented `code_verifier` against the `code_challenge` stored at
/// authorization-request time. Used server-side by anything emulating the
/// authorization server in tests, and internally to sanity-check generated
/// pairs.
pub fn verify(code_verifier: &str, code_challenge: &str) -> bool {
    challenge_for(code_verifier) == code_challenge
}

/// Generate a cryptographically random, opaque `state` value: 128 bits,
/// base64url-encoded without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

//! PKCE (Proof Key for Code Exchange) material for OAuth 2.0
//!
//! Implements RFC 7636: the code verifier stays server-side, only its SHA-256
//! challenge travels through the browser redirect. The CSRF state token is
//! generated from the same secure random source.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure code verifier.
///
/// 32 random bytes, base64url-encoded to 43 characters, within the RFC 7636
/// 43-128 character window.
#[must_use]
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Derive the code challenge from a verifier.
///
/// Per RFC 7636: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF protection.
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Freshly generated PKCE material for one handshake attempt.
///
/// Never reuse an instance across two handshakes: verifier and state
/// collisions are both correctness and security bugs.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random string (43-128 chars, base64url). Kept secret until token
    /// exchange.
    pub code_verifier: String,

    /// SHA-256 hash of `code_verifier` (base64url). Sent in the authorization
    /// request.
    pub code_challenge: String,

    /// Random CSRF protection token, round-tripped through the redirect.
    pub state: String,
}

impl PkceChallenge {
    /// Generate a new challenge with fresh random values.
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        Self { code_verifier, code_challenge, state }
    }

    /// The challenge method sent to the provider (always "S256").
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_satisfies_rfc_7636_length() {
        let challenge = PkceChallenge::generate();

        assert!(
            challenge.code_verifier.len() >= 43,
            "code_verifier too short: {} chars",
            challenge.code_verifier.len()
        );
        assert!(
            challenge.code_verifier.len() <= 128,
            "code_verifier too long: {} chars",
            challenge.code_verifier.len()
        );
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let challenge = PkceChallenge::generate();
        let recomputed = generate_code_challenge(&challenge.code_verifier);

        assert_eq!(challenge.code_challenge, recomputed);
    }

    #[test]
    fn generation_never_reuses_material() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();

        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.code_challenge, b.code_challenge);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn material_is_base64url_without_padding() {
        let challenge = PkceChallenge::generate();

        for value in [&challenge.code_verifier, &challenge.code_challenge, &challenge.state] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    #[test]
    fn challenge_method_is_s256() {
        assert_eq!(PkceChallenge::generate().challenge_method(), "S256");
    }
}

//! PKCE S256 verifier/challenge generation
//!
//! Implements the Proof Key for Code Exchange extension to OAuth 2.0 as
//! defined in RFC 7636, using the `S256` challenge method.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string, the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request carries `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange request carries the original `code_verifier`.
//! 5. The authorization server recomputes the challenge and compares.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// The only challenge method this crate sends.
pub const CHALLENGE_METHOD: &str = "S256";

/// Random bytes drawn for each verifier (64 characters once encoded).
const VERIFIER_BYTES: usize = 48;

/// Random bytes drawn for each `state` nonce.
const STATE_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// PkcePair
// ---------------------------------------------------------------------------

/// A PKCE verifier and its S256 challenge.
///
/// Created fresh for each authorization attempt and dropped after the code
/// exchange that consumes it. Never persisted.
///
/// # Examples
///
/// ```
/// use brightspace_auth::auth::pkce;
///
/// let pair = pkce::generate();
/// assert_eq!(pair.verifier.len(), 64);
/// assert_eq!(pair.challenge, pkce::challenge_for(&pair.verifier));
/// ```
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Base64url (no padding) encoding of 48 random bytes.
    ///
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,

    /// Base64url (no padding) SHA-256 digest of the verifier's ASCII bytes.
    ///
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a fresh PKCE pair.
///
/// Entropy comes from the thread-local CSPRNG; a failing entropy source
/// aborts the process rather than returning an error.
pub fn generate() -> PkcePair {
    let mut random_bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill_bytes(&mut random_bytes);

    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let challenge = challenge_for(&verifier);

    PkcePair {
        verifier,
        challenge,
    }
}

/// Computes the S256 challenge for `verifier`.
///
/// RFC 7636 section 4.2: `BASE64URL(SHA256(ASCII(code_verifier)))`.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Generates an opaque anti-CSRF `state` nonce for one authorization attempt.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_base64url(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_generate_produces_verifier_within_pkce_length_bounds() {
        let pair = generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!((43..=128).contains(&pair.verifier.len()));
    }

    #[test]
    fn test_challenge_is_s256_of_verifier() {
        let pair = generate();
        let digest = Sha256::digest(pair.verifier.as_bytes());
        let expected = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice());
        assert_eq!(pair.challenge, expected);
    }

    #[test]
    fn test_verifier_and_challenge_use_base64url_without_padding() {
        let pair = generate();
        assert!(is_base64url(&pair.verifier), "verifier: {}", pair.verifier);
        assert!(is_base64url(&pair.challenge), "challenge: {}", pair.challenge);
        assert_eq!(pair.challenge.len(), 43);
    }

    #[test]
    fn test_verifiers_do_not_repeat() {
        let verifiers: HashSet<String> = (0..1000).map(|_| generate().verifier).collect();
        assert_eq!(verifiers.len(), 1000);
    }

    #[test]
    fn test_state_is_base64url_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 22);
        assert!(is_base64url(&a));
        assert_ne!(a, b);
    }

    /// RFC 7636 Appendix B test vector.
    #[test]
    fn test_s256_known_answer_rfc7636_appendix_b() {
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}

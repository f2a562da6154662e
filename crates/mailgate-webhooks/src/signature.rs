//! Inbound webhook signature verification
//!
//! The provider signs its callbacks with a shared secret; verification runs
//! over the raw request body bytes, before any JSON parsing, so middleware
//! re-serialization can never corrupt the signed payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of checking an inbound signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Signature present and correct
    Valid,
    /// Signature absent or wrong; the request must be rejected
    Invalid,
    /// No signing secret configured; verification disabled (permissive mode)
    Skipped,
}

/// Verify an HMAC-SHA256 signature over the raw body bytes.
///
/// With no configured secret, verification is skipped with a loud warning
/// rather than failing closed. That is a deliberate development-mode
/// convenience; production deployments configure the secret.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    provided: Option<&str>,
) -> SignatureCheck {
    let Some(secret) = secret else {
        warn!("Inbound signature verification disabled: no signing secret configured");
        return SignatureCheck::Skipped;
    };

    let Some(provided) = provided else {
        return SignatureCheck::Invalid;
    };

    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(expected) = hex::decode(provided.trim()) else {
        return SignatureCheck::Invalid;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);

    match mac.verify_slice(&expected) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid,
    }
}

/// Sign a payload the way the provider does, for tests and local tooling
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"email.delivered"}"#;
        let signature = sign("secret", body);

        assert_eq!(
            verify_signature(Some("secret"), body, Some(&signature)),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn test_signature_without_prefix_is_accepted() {
        let body = b"payload";
        let signature = sign("secret", body);
        let bare = signature.strip_prefix("sha256=").unwrap();

        assert_eq!(
            verify_signature(Some("secret"), body, Some(bare)),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let body = b"payload";
        let signature = sign("other", body);

        assert_eq!(
            verify_signature(Some("secret"), body, Some(&signature)),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn test_tampered_body_is_invalid() {
        let signature = sign("secret", b"payload");

        assert_eq!(
            verify_signature(Some("secret"), b"tampered", Some(&signature)),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn test_missing_signature_is_invalid() {
        assert_eq!(
            verify_signature(Some("secret"), b"payload", None),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn test_garbage_signature_is_invalid() {
        assert_eq!(
            verify_signature(Some("secret"), b"payload", Some("not-hex!")),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn test_no_secret_skips_verification() {
        assert_eq!(
            verify_signature(None, b"payload", Some("anything")),
            SignatureCheck::Skipped
        );
        assert_eq!(
            verify_signature(None, b"payload", None),
            SignatureCheck::Skipped
        );
    }
}

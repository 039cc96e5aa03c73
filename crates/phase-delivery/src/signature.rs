//! HMAC-SHA256 payload signing for webhook authenticity.
//!
//! Every delivery attempt is signed with the webhook's secret over the
//! exact payload bytes that go on the wire. Subscribers recompute the
//! HMAC with their copy of the secret and compare.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeliveryError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Phase-Signature";

/// Signs a payload, producing the signature header value.
///
/// Format is `sha256=<hex>` over the raw payload bytes. The signature
/// is computed per attempt, so a secret visible to the worker at send
/// time is always the one used.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String> {
    let hex_digest = generate_hmac_hex(payload, secret)?;
    Ok(format!("sha256={hex_digest}"))
}

/// Generates an HMAC-SHA256 digest as a lowercase hex string.
pub fn generate_hmac_hex(payload: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::configuration(format!("invalid signing secret: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a `sha256=<hex>` signature against a payload and secret.
///
/// Provided for subscriber-side verification and tests. Comparison is
/// timing-safe.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> Result<bool> {
    let Some(hex_signature) = signature.strip_prefix("sha256=") else {
        return Ok(false);
    };
    let expected = generate_hmac_hex(payload, secret)?;
    Ok(timing_safe_eq(hex_signature, &expected))
}

/// Constant-time string comparison.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_sha256_prefix() {
        let sig = sign_payload(b"payload", "whsec_test").unwrap();
        assert!(sig.starts_with("sha256="));
        // 32-byte digest hex encoded
        assert_eq!(sig.len(), "sha256=".len() + 64);
    }

    #[test]
    fn signature_verifies_with_matching_secret() {
        let payload = b"{\"event\":\"stake_confirmed\"}";
        let sig = sign_payload(payload, "whsec_abc").unwrap();
        assert!(verify_signature(payload, &sig, "whsec_abc").unwrap());
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let payload = b"{\"event\":\"stake_confirmed\"}";
        let sig = sign_payload(payload, "whsec_abc").unwrap();
        assert!(!verify_signature(payload, &sig, "whsec_other").unwrap());
    }

    #[test]
    fn signature_rejects_tampered_payload() {
        let sig = sign_payload(b"original", "whsec_abc").unwrap();
        assert!(!verify_signature(b"tampered", &sig, "whsec_abc").unwrap());
    }

    #[test]
    fn same_input_produces_same_signature() {
        let a = sign_payload(b"payload", "whsec_abc").unwrap();
        let b = sign_payload(b"payload", "whsec_abc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_prefix_fails_verification() {
        let hex = generate_hmac_hex(b"payload", "whsec_abc").unwrap();
        assert!(!verify_signature(b"payload", &hex, "whsec_abc").unwrap());
    }
}

//! Webhook signature verification for the payment provider callback.
//!
//! The provider signs the raw request body with HMAC-SHA256 over a shared
//! secret and sends the hex digest in the `webhook-signature` header. The
//! fulfillment entry point is only reachable once this check passes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "webhook-signature";

pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);

    // verify_slice is constant-time
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let body = br#"{"type":"order.paid"}"#;
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &signature));
    }

    #[test]
    fn test_signature_over_different_body_is_rejected() {
        let signature = sign("topsecret", b"original");
        assert!(!verify_signature("topsecret", b"tampered", &signature));
    }

    #[test]
    fn test_signature_with_wrong_secret_is_rejected() {
        let body = b"payload";
        let signature = sign("other-secret", body);
        assert!(!verify_signature("topsecret", body, &signature));
    }

    #[test]
    fn test_malformed_hex_is_rejected() {
        assert!(!verify_signature("topsecret", b"payload", "zz-not-hex"));
        assert!(!verify_signature("topsecret", b"payload", ""));
    }
}

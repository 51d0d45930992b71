//! Webhook signature checks (HMAC-SHA256, hex encoded)

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a hex signature against `body`.
/// Malformed hex and empty secrets never verify.
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let expected = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let body = br#"{"id":"purch_1","status":"paid"}"#;
        let sig = sign("whsec", body);

        assert_eq!(sig.len(), 64);
        assert!(verify("whsec", body, &sig));
        assert!(verify("whsec", body, &sig.to_uppercase()));
    }

    #[test]
    fn test_rejects_tampering() {
        let sig = sign("whsec", b"original");
        assert!(!verify("whsec", b"tampered", &sig));
        assert!(!verify("other", b"original", &sig));
        assert!(!verify("whsec", b"original", "not-hex"));
        assert!(!verify("", b"original", &sign("", b"original")));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}

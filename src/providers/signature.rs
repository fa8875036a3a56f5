use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Constant-time byte comparison. Length mismatch short-circuits, which is
/// fine since signature lengths are public.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verifies a lowercase-hex HMAC-SHA256 signature over the raw payload bytes.
pub fn verify_hmac_sha256_hex(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature_hex.trim().to_lowercase().as_bytes())
}

/// Verifies a lowercase-hex HMAC-SHA512 signature over the raw payload bytes.
pub fn verify_hmac_sha512_hex(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex::encode(mac.finalize().into_bytes());
    secure_eq(computed.as_bytes(), signature_hex.trim().to_lowercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_sha256(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn sign_sha512(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn secure_eq_matches_equal_slices() {
        assert!(secure_eq(b"abc123", b"abc123"));
        assert!(!secure_eq(b"abc123", b"abc124"));
        assert!(!secure_eq(b"abc", b"abcd"));
    }

    #[test]
    fn sha256_verification_round_trips() {
        let payload = br#"{"event":"payment.success","reference":"ref_1"}"#;
        let sig = sign_sha256("whsec_test", payload);
        assert!(verify_hmac_sha256_hex("whsec_test", payload, &sig));
        assert!(!verify_hmac_sha256_hex("whsec_other", payload, &sig));
    }

    #[test]
    fn sha256_verification_accepts_uppercase_hex() {
        let payload = b"payload";
        let sig = sign_sha256("secret", payload).to_uppercase();
        assert!(verify_hmac_sha256_hex("secret", payload, &sig));
    }

    #[test]
    fn sha512_verification_round_trips() {
        let payload = br#"{"txnid":"AT-1","status":"SUCCESS"}"#;
        let sig = sign_sha512("whsec_test", payload);
        assert!(verify_hmac_sha512_hex("whsec_test", payload, &sig));
        assert!(!verify_hmac_sha512_hex("whsec_test", b"tampered", &sig));
    }

    #[test]
    fn altered_payload_fails_verification() {
        let payload = br#"{"amount":"100.00"}"#;
        let sig = sign_sha256("secret", payload);
        assert!(!verify_hmac_sha256_hex(
            "secret",
            br#"{"amount":"999.00"}"#,
            &sig
        ));
    }
}

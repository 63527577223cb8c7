use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute a hex-encoded HMAC-SHA256 over `payload`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex-encoded HMAC-SHA256 signature using constant-time comparison.
pub fn verify_hmac_sha256_hex(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(constant_time_eq(expected.as_bytes(), signature.as_bytes()))
}

/// Constant-time byte comparison; unequal lengths compare unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip() {
        let secret = "my_secret_key";
        let body = br#"{"id":"order_1","status":"PAID"}"#;

        let signature = hmac_sha256_hex(secret, body).unwrap();
        assert!(!signature.is_empty());
        assert!(verify_hmac_sha256_hex(secret, body, &signature).unwrap());
    }

    #[test]
    fn mutated_payload_invalidates_signature() {
        let secret = "my_secret_key";
        let body = br#"{"id":"order_1","status":"PAID"}"#;
        let signature = hmac_sha256_hex(secret, body).unwrap();

        let mut tampered = body.to_vec();
        tampered[10] ^= 1;
        assert!(!verify_hmac_sha256_hex(secret, &tampered, &signature).unwrap());
    }

    #[test]
    fn mutated_signature_is_rejected() {
        let secret = "my_secret_key";
        let body = b"payload";
        let signature = hmac_sha256_hex(secret, body).unwrap();
        let tampered = format!("a{}", &signature[1..]);

        assert!(!verify_hmac_sha256_hex(secret, body, &tampered).unwrap());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

//! # Signatures
//!
//! HMAC-SHA256 signatures over the concatenated request and response fields.
//! Amounts enter the signature as bare digits (`1,278.99` signs as `127899`).

use hmac::{Hmac, Mac};
use pay_core::{PaymentError, PaymentResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Value of the `SignatureType` form field
pub const SIGNATURE_TYPE: &str = "HMACSHA256";

/// Signature sent with a checkout request
pub fn request_signature(
    merchant_key: &str,
    merchant_code: &str,
    ref_no: &str,
    amount_digits: &str,
    currency: &str,
    xfield1: &str,
) -> PaymentResult<String> {
    compute_hmac_sha256(
        merchant_key,
        &[merchant_key, merchant_code, ref_no, amount_digits, currency, xfield1].concat(),
    )
}

/// Signature the gateway attaches to its response and backend post
pub fn response_signature(
    merchant_key: &str,
    merchant_code: &str,
    payment_id: &str,
    ref_no: &str,
    amount_digits: &str,
    currency: &str,
    status: &str,
) -> PaymentResult<String> {
    compute_hmac_sha256(
        merchant_key,
        &[
            merchant_key,
            merchant_code,
            payment_id,
            ref_no,
            amount_digits,
            currency,
            status,
        ]
        .concat(),
    )
}

fn compute_hmac_sha256(secret: &str, message: &str) -> PaymentResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare two signatures without short-circuiting on the first difference
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_signature_shape() {
        let sig = request_signature("key", "M001", "REF1", "127899", "MYR", "").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        // Every signed field matters
        let other = request_signature("key", "M001", "REF1", "127898", "MYR", "").unwrap();
        assert_ne!(sig, other);
    }

    #[test]
    fn test_response_signature_differs_by_status() {
        let paid = response_signature("key", "M001", "2", "REF1", "100", "MYR", "1").unwrap();
        let failed = response_signature("key", "M001", "2", "REF1", "100", "MYR", "0").unwrap();
        assert_ne!(paid, failed);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}

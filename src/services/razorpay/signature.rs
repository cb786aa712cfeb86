use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify the checkout callback signature.
    /// signature = HMAC-SHA256(order_id + "|" + payment_id, secret), hex
    ///
    /// A mismatch is a normal `Ok(false)`; only missing arguments or a
    /// missing secret are errors. The field order and the `|` separator are
    /// part of the gateway's wire contract, byte for byte.
    pub fn verify_payment_signature(
        order_id: &str,
        payment_id: &str,
        signature: &str,
        secret: &str,
    ) -> AppResult<bool> {
        if order_id.is_empty() || payment_id.is_empty() || signature.is_empty() {
            return Err(AppError::Validation(
                "order id, payment id and signature are required".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(AppError::Config("Razorpay key secret is not set".to_string()));
        }

        let payload = format!("{}|{}", order_id, payment_id);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("HMAC initialization failed: {}", e)))?;

        mac.update(payload.as_bytes());

        let expected_signature = hex::encode(mac.finalize().into_bytes());

        Ok(secure_compare(
            expected_signature.as_bytes(),
            signature.as_bytes(),
        ))
    }

    /// Verify a webhook delivery against the raw request body.
    /// Razorpay sends the signature in the X-Razorpay-Signature header.
    pub fn verify_webhook_signature(
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<bool> {
        if signature.is_empty() {
            return Err(AppError::Validation("signature is required".to_string()));
        }
        if secret.is_empty() {
            return Err(AppError::Config("Razorpay webhook secret is not set".to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("HMAC initialization failed: {}", e)))?;

        mac.update(payload);

        let expected_signature = hex::encode(mac.finalize().into_bytes());

        Ok(secure_compare(
            expected_signature.as_bytes(),
            signature.as_bytes(),
        ))
    }
}

/// Constant-time comparison. Signature checks must not leak how many leading
/// bytes matched.
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
        let payload = format!("{}|{}", order_id, payment_id);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let order_id = "order_DBJOWzybf0sJbb";
        let payment_id = "pay_DGR9FPNxfgIqvp";
        let secret = "EnAtY1HnJlrGZfbVJqKMKfVP";

        let signature = sign(order_id, payment_id, secret);

        let result =
            SignatureVerifier::verify_payment_signature(order_id, payment_id, &signature, secret);

        assert!(result.unwrap());
    }

    #[test]
    fn mismatch_is_false_not_error() {
        let result = SignatureVerifier::verify_payment_signature(
            "order_test",
            "pay_test",
            "deadbeef",
            "test_secret",
        );

        assert!(!result.unwrap());
    }

    #[test]
    fn flipping_any_character_rejects() {
        let order_id = "order_abc123";
        let payment_id = "pay_xyz789";
        let secret = "s3cret";
        let signature = sign(order_id, payment_id, secret);

        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let pos = rng.gen_range(0..signature.len());
            let mut tampered: Vec<u8> = signature.bytes().collect();
            tampered[pos] ^= 0x01;
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == signature {
                continue;
            }
            assert!(!SignatureVerifier::verify_payment_signature(
                order_id, payment_id, &tampered, secret
            )
            .unwrap());
        }

        // Tampering the signed fields breaks verification too.
        assert!(!SignatureVerifier::verify_payment_signature(
            "order_abc124",
            payment_id,
            &signature,
            secret
        )
        .unwrap());
        assert!(!SignatureVerifier::verify_payment_signature(
            order_id,
            "pay_xyz780",
            &signature,
            secret
        )
        .unwrap());
    }

    #[test]
    fn missing_arguments_are_invalid() {
        let result =
            SignatureVerifier::verify_payment_signature("", "pay_test", "sig", "secret");
        assert!(matches!(result, Err(crate::error::AppError::Validation(_))));

        let result =
            SignatureVerifier::verify_payment_signature("order_test", "pay_test", "", "secret");
        assert!(matches!(result, Err(crate::error::AppError::Validation(_))));
    }

    #[test]
    fn missing_secret_fails_closed() {
        let result =
            SignatureVerifier::verify_payment_signature("order_test", "pay_test", "sig", "");
        assert!(matches!(result, Err(crate::error::AppError::Config(_))));
    }

    #[test]
    fn webhook_signature_roundtrip() {
        let body = br#"{"event":"payment.captured"}"#;
        let secret = "whsec_test";

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(SignatureVerifier::verify_webhook_signature(body, &signature, secret).unwrap());
        assert!(!SignatureVerifier::verify_webhook_signature(
            br#"{"event":"payment.failed"}"#,
            &signature,
            secret
        )
        .unwrap());
    }

    #[test]
    fn secure_compare_rejects_length_and_content_differences() {
        assert!(secure_compare(b"abc123", b"abc123"));
        assert!(!secure_compare(b"abc123", b"abc124"));
        assert!(!secure_compare(b"abc123", b"abc12"));
    }
}

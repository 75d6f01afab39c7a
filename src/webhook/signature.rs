use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Authenticate a delivery before anything in it is trusted.
///
/// `header` is the raw `X-Hub-Signature-256` value. Any failure is a
/// `Validation` error, so the relay answers 400 and never starts a run.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> Result<()> {
    let digest = header
        .strip_prefix("sha256=")
        .ok_or_else(|| AppError::Validation("signature lacks the sha256= scheme".to_string()))?;
    let expected = hex::decode(digest)
        .map_err(|e| AppError::Validation(format!("signature is not hex: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Validation(format!("unusable webhook secret: {e}")))?;
    mac.update(payload);
    // verify_slice compares in constant time.
    mac.verify_slice(&expected)
        .map_err(|_| AppError::Validation("signature does not match payload".to_string()))
}

/// Compute the header value GitHub would send for `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid HMAC key: {e}")))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

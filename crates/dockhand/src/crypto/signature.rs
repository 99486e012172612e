//! HMAC-SHA256 signing of callback payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded `HMAC-SHA256(secret, payload)`.
pub fn sign_payload(secret: &[u8], payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Callback(format!("Invalid callback secret: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

//! AES-256-GCM encryption for secret values.
//!
//! Ciphertexts are stored as `hex(iv):hex(auth_tag):hex(ciphertext)` with a
//! fresh 16-byte IV per encryption.

use std::fmt;

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;

use crate::config::RunMode;
use crate::error::{AppError, AppResult};

/// IV size (128 bits / 16 bytes).
const IV_SIZE: usize = 16;

/// GCM authentication tag size.
const TAG_SIZE: usize = 16;

/// Key size for AES-256 (256 bits / 32 bytes).
const KEY_SIZE: usize = 32;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// The process-wide secret encryption key.
///
/// Loaded once at startup and handed to [`SecretCipher::new`]; never rotated
/// while the process runs.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Parse a key given as 64 hex characters or as base64.
    pub fn parse(value: &str) -> AppResult<Self> {
        let value = value.trim();
        let bytes = if value.len() == KEY_SIZE * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
        {
            hex::decode(value)
                .map_err(|e| AppError::Encryption(format!("Invalid hex key: {}", e)))?
        } else {
            BASE64
                .decode(value)
                .map_err(|e| AppError::Encryption(format!("Invalid base64 key: {}", e)))?
        };

        Self::from_bytes(&bytes)
    }

    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is not 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            AppError::Encryption(format!(
                "Invalid key length: expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill(&mut key[..]);
        Self(key)
    }

    /// Resolve the startup key.
    ///
    /// Production refuses to run without a configured key. Any other mode
    /// falls back to an ephemeral key, so secrets written in that run cannot
    /// be read after a restart.
    pub fn load(configured: Option<&str>, mode: RunMode) -> AppResult<Self> {
        match configured.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Self::parse(value),
            None if mode == RunMode::Production => Err(AppError::Config(
                "DOCKHAND_ENCRYPTION_KEY must be set in production".to_string(),
            )),
            None => {
                tracing::warn!(
                    "DOCKHAND_ENCRYPTION_KEY not set, using an ephemeral key (not for production)"
                );
                Ok(Self::generate())
            }
        }
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypts and decrypts secret values.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm16,
}

impl SecretCipher {
    pub fn new(key: &EncryptionKey) -> AppResult<Self> {
        let cipher = Aes256Gcm16::new_from_slice(&key.0)
            .map_err(|e| AppError::Encryption(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Encrypt a value into `iv:tag:ciphertext` form.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Decrypt an `iv:tag:ciphertext` value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decryption`] for malformed input, a wrong key or a
    /// tag mismatch.
    pub fn decrypt(&self, encoded: &str) -> AppResult<String> {
        let parts: Vec<&str> = encoded.split(':').collect();
        let [iv_hex, tag_hex, body_hex] = parts.as_slice() else {
            return Err(AppError::Decryption(format!(
                "Expected 3 segments, got {}",
                parts.len()
            )));
        };

        let iv = decode_segment("iv", iv_hex)?;
        let tag = decode_segment("auth tag", tag_hex)?;
        let mut buffer = decode_segment("ciphertext", body_hex)?;

        if iv.len() != IV_SIZE {
            return Err(AppError::Decryption(format!(
                "Invalid iv length: expected {} bytes, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(AppError::Decryption(format!(
                "Invalid auth tag length: expected {} bytes, got {}",
                TAG_SIZE,
                tag.len()
            )));
        }

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| AppError::Decryption("Authentication failed".to_string()))?;

        String::from_utf8(buffer)
            .map_err(|e| AppError::Decryption(format!("Plaintext is not UTF-8: {}", e)))
    }
}

fn decode_segment(label: &str, segment: &str) -> AppResult<Vec<u8>> {
    hex::decode(segment).map_err(|e| AppError::Decryption(format!("Invalid {} hex: {}", label, e)))
}

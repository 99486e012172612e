//! Cryptography module for Dockhand.
//!
//! Provides AES-256-GCM encryption for secret values and HMAC signing for
//! deployment callbacks.

pub mod cipher;
pub mod signature;

pub use cipher::{EncryptionKey, SecretCipher};
pub use signature::sign_payload;

//! Symmetric encryption of individual string fields.
//!
//! Encrypted values are stored as `enc:v1:<base64(nonce)>:<base64(ciphertext)>`
//! using AES-256-GCM with a fresh random nonce per call. A value without the
//! `enc:v1:` sentinel is treated as plaintext and passed through unchanged,
//! which keeps documents written before encryption was introduced readable.
//!
//! Failure policy: neither direction ever raises. A cryptographic failure is
//! logged and the input comes back unchanged, so a corrupted field degrades to
//! garbled text instead of taking the caller down. The cost is that a value
//! that failed to decrypt is indistinguishable from one that was never
//! encrypted.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Sentinel prefix marking a stored value as ciphertext.
pub const CIPHERTEXT_PREFIX: &str = "enc:v1:";

/// Internal cipher failures. Never escape the public API.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("malformed encrypted field")]
    Malformed,
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("aead operation failed")]
    Aead,
    #[error("decrypted field is not valid utf-8")]
    Utf8,
}

/// Per-string symmetric cipher with graceful degrade-to-plaintext.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; KEY_LEN],
}

impl FieldCipher {
    /// Derives the AES-256 key as SHA-256 of the configured passphrase.
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypts one field value. Empty input stays empty; on failure the
    /// plaintext is returned unchanged.
    pub fn encrypt_field(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        match self.try_encrypt(plaintext) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%err, "field encryption failed, keeping plaintext");
                plaintext.to_string()
            }
        }
    }

    /// Decrypts one field value. Values without the ciphertext sentinel pass
    /// through unchanged; on failure the stored value is returned unchanged.
    pub fn decrypt_field(&self, stored: &str) -> String {
        if stored.is_empty() {
            return String::new();
        }
        if !stored.starts_with(CIPHERTEXT_PREFIX) {
            return stored.to_string();
        }
        match self.try_decrypt(stored) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(%err, "field decryption failed, returning stored value");
                stored.to_string()
            }
        }
    }

    fn try_encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::Aead)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Aead)?;
        Ok(format!(
            "{CIPHERTEXT_PREFIX}{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    fn try_decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let rest = stored
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or(CipherError::Malformed)?;
        let (nonce_b64, ciphertext_b64) = rest.split_once(':').ok_or(CipherError::Malformed)?;
        let nonce_raw = BASE64.decode(nonce_b64)?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(CipherError::Malformed);
        }
        let ciphertext = BASE64.decode(ciphertext_b64)?;
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CipherError::Aead)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|_| CipherError::Aead)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)
    }
}

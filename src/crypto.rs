//! Symmetric encryption of opaque identifiers.
//!
//! The JWT compatibility endpoint receives an intent id together with an encrypted copy
//! of it. [`EncryptionAlgorithm`] is the capability used to check the pair. The bundled
//! [`AesGcmKeyRing`] stores values as `nonce (12 bytes) || ciphertext`.

use std::{collections::HashMap, sync::Arc};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use thiserror::Error;

use crate::config::EncryptionConfig;

/// AES-256-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unknown encryption key: {0}")]
    UnknownKey(String),

    #[error("Invalid encryption key {key_id}: {reason}")]
    InvalidKey { key_id: String, reason: String },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

pub type SharedEncryption = Arc<dyn EncryptionAlgorithm>;

pub trait EncryptionAlgorithm: Send + Sync {
    /// Identifier of the key new values are encrypted with.
    fn encryption_key_id(&self) -> &str;

    fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError>;

    fn decrypt_string(&self, ciphertext: &[u8], key_id: &str) -> Result<String, CryptoError> {
        let plaintext = self.decrypt(ciphertext, key_id)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

/// AES-256-GCM keys addressed by id.
pub struct AesGcmKeyRing {
    active_key_id: String,
    keys: HashMap<String, Aes256Gcm>,
}

impl AesGcmKeyRing {
    pub fn new(active_key_id: impl Into<String>) -> Self {
        Self {
            active_key_id: active_key_id.into(),
            keys: HashMap::new(),
        }
    }

    /// Add a raw 32-byte key.
    pub fn with_key(mut self, key_id: impl Into<String>, key: &[u8]) -> Result<Self, CryptoError> {
        let key_id = key_id.into();
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey {
            key_id: key_id.clone(),
            reason: format!("expected 32 bytes, got {}", key.len()),
        })?;
        self.keys.insert(key_id, cipher);
        Ok(self)
    }

    /// Build the key ring from base64-encoded keys in configuration.
    pub fn from_config(config: &EncryptionConfig) -> Result<Self, CryptoError> {
        let mut ring = Self::new(config.active_key_id.clone());
        for (key_id, encoded) in &config.keys {
            let key = BASE64
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey {
                    key_id: key_id.clone(),
                    reason: format!("invalid base64: {e}"),
                })?;
            ring = ring.with_key(key_id.clone(), &key)?;
        }
        Ok(ring)
    }

    fn cipher(&self, key_id: &str) -> Result<&Aes256Gcm, CryptoError> {
        self.keys
            .get(key_id)
            .ok_or_else(|| CryptoError::UnknownKey(key_id.to_string()))
    }
}

impl EncryptionAlgorithm for AesGcmKeyRing {
    fn encryption_key_id(&self) -> &str {
        &self.active_key_id
    }

    fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher(key_id)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8], key_id: &str) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CryptoError::Decryption("ciphertext too short".to_string()));
        }
        let cipher = self.cipher(key_id)?;

        let (nonce_bytes, ciphertext) = ciphertext.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

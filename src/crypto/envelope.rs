//! Envelope encryption backend.
//!
//! Every payload gets its own random data encryption key (DEK). The DEK is
//! wrapped with the key encryption key (KEK) of the requested key id, and the
//! wrapped DEK travels with the ciphertext:
//!
//! ```text
//! version(1) || kek_nonce(12) || wrapped_dek(48) || data_nonce(12) || ciphertext
//! ```

use async_trait::async_trait;

use crate::crypto::aes::{self, SecureKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::crypto::kek::KekCache;
use crate::error::{BrokerError, Result};

/// Authenticated encryption of opaque payloads under a named key.
#[async_trait]
pub trait EncryptionBackend: Send + Sync {
    /// Encrypts `plaintext` under the key identified by `key_id`.
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypts `ciphertext` produced by [`EncryptionBackend::encrypt`] with the same `key_id`.
    ///
    /// Fails with `BrokerError::Decryption` on malformed input or a failed tag check.
    async fn decrypt(&self, key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

const ENVELOPE_VERSION: u8 = 1;
const WRAPPED_DEK_SIZE: usize = KEY_SIZE + TAG_SIZE;
const HEADER_SIZE: usize = 1 + NONCE_SIZE + WRAPPED_DEK_SIZE + NONCE_SIZE;

/// AES-256-GCM envelope encryption with KEKs derived from a local master key.
#[derive(Clone)]
pub struct AeadEnvelopeBackend {
    keks: KekCache,
}

impl AeadEnvelopeBackend {
    /// Creates a backend whose KEKs derive from `master_key` (32 bytes).
    pub fn new(master_key: &[u8]) -> Result<Self> {
        Ok(Self {
            keks: KekCache::new(master_key)?,
        })
    }
}

#[async_trait]
impl EncryptionBackend for AeadEnvelopeBackend {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let kek = self.keks.get(key_id).await;
        let dek = aes::generate_key();

        let (wrapped_dek, kek_nonce) = aes::encrypt(&kek, dek.as_bytes(), key_id.as_bytes())?;
        let (ciphertext, data_nonce) = aes::encrypt(&dek, plaintext, key_id.as_bytes())?;

        let mut envelope = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&kek_nonce);
        envelope.extend_from_slice(&wrapped_dek);
        envelope.extend_from_slice(&data_nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    async fn decrypt(&self, key_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < HEADER_SIZE + TAG_SIZE {
            return Err(BrokerError::Decryption("Envelope too short".to_string()));
        }
        if ciphertext[0] != ENVELOPE_VERSION {
            return Err(BrokerError::Decryption(format!(
                "Unsupported envelope version {}",
                ciphertext[0]
            )));
        }

        let (kek_nonce, rest) = ciphertext[1..].split_at(NONCE_SIZE);
        let (wrapped_dek, rest) = rest.split_at(WRAPPED_DEK_SIZE);
        let (data_nonce, body) = rest.split_at(NONCE_SIZE);

        let kek_nonce: [u8; NONCE_SIZE] = kek_nonce
            .try_into()
            .map_err(|_| BrokerError::Decryption("Invalid nonce size".to_string()))?;
        let data_nonce: [u8; NONCE_SIZE] = data_nonce
            .try_into()
            .map_err(|_| BrokerError::Decryption("Invalid nonce size".to_string()))?;

        let kek = self.keks.get(key_id).await;
        let dek_bytes = zeroize::Zeroizing::new(aes::decrypt(
            &kek,
            wrapped_dek,
            &kek_nonce,
            key_id.as_bytes(),
        )?);
        let dek: [u8; KEY_SIZE] = dek_bytes
            .as_slice()
            .try_into()
            .map_err(|_| BrokerError::Decryption("Invalid DEK size".to_string()))?;
        let dek = SecureKey::new(dek);

        aes::decrypt(&dek, body, &data_nonce, key_id.as_bytes())
    }
}

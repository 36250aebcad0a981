use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::crypto::aes::{SecureKey, KEY_SIZE};
use crate::error::{BrokerError, Result};

/// A cache of Key Encryption Keys (KEKs), one per key id.
///
/// KEKs are derived from the master key, so the cache only saves the
/// derivation; losing it is harmless.
#[derive(Clone)]
pub struct KekCache {
    master_key: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    cache: Arc<RwLock<HashMap<String, SecureKey>>>,
}

impl KekCache {
    /// Creates a new `KekCache` over the given master key.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        let master_key: [u8; KEY_SIZE] = master_key
            .try_into()
            .map_err(|_| BrokerError::Encryption("Invalid master key size".to_string()))?;

        Ok(Self {
            master_key: Arc::new(Zeroizing::new(master_key)),
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Returns the KEK for `key_id`, deriving and caching it on first use.
    pub async fn get(&self, key_id: &str) -> SecureKey {
        if let Some(kek) = self.cache.read().await.get(key_id) {
            return kek.clone();
        }

        let kek = derive_kek(&self.master_key, key_id);
        let mut cache = self.cache.write().await;
        let kek = cache.entry(key_id.to_string()).or_insert(kek).clone();
        tracing::debug!("✅ KEK for key id {} derived and cached", key_id);
        kek
    }

    /// Number of cached KEKs.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Clears the KEK cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

/// Derives the KEK for `key_id` from the master key.
fn derive_kek(master_key: &[u8; KEY_SIZE], key_id: &str) -> SecureKey {
    let hash = blake3::keyed_hash(master_key, key_id.as_bytes());
    SecureKey::new(*hash.as_bytes())
}

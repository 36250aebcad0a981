//! Cache-aside fetch engine with stampede protection.
//!
//! Lookup order for a key:
//!
//! 1. local cache (plaintext, this process only)
//! 2. remote cache (ciphertext, shared by the fleet)
//! 3. `compute`, serialized by the lock `<key>_lock` so that only one caller
//!    across the fleet computes a given key per miss window
//!
//! Every remote hit also warms the local tier. Compute failures are never
//! cached and always release the lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::local::LocalCache;
use crate::cache::remote::RemoteCache;
use crate::crypto::envelope::EncryptionBackend;
use crate::error::{BrokerError, Result};

/// One kind of cached value and how to produce it.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Key shared by the local and remote tiers.
    fn cache_key(&self) -> String;

    /// How long the local tier keeps the value (`None` = process lifetime).
    fn local_ttl(&self) -> Option<Duration>;

    /// How long the remote tier keeps the value (`None` = no expiry).
    fn remote_ttl(&self) -> Option<Duration>;

    /// Whether the value may leave the process. Fetches whose key embeds a
    /// secret must return `false`.
    fn remote_caching(&self) -> bool {
        true
    }

    /// Produces the true value on a miss in every tier.
    async fn compute(&self) -> Result<Self::Value>;
}

/// The two-tier cache-aside engine.
#[derive(Clone)]
pub struct CacheFetcher {
    local: LocalCache,
    remote: Arc<dyn RemoteCache>,
    encryption: Arc<dyn EncryptionBackend>,
    key_id: String,
    fail_open: bool,
}

impl CacheFetcher {
    /// Creates a fetcher.
    ///
    /// Remote values are encrypted under `key_id`. With `fail_open`, an
    /// unreachable remote tier degrades to local-only caching instead of
    /// failing the request.
    pub fn new(
        local: LocalCache,
        remote: Arc<dyn RemoteCache>,
        encryption: Arc<dyn EncryptionBackend>,
        key_id: impl Into<String>,
        fail_open: bool,
    ) -> Self {
        Self {
            local,
            remote,
            encryption,
            key_id: key_id.into(),
            fail_open,
        }
    }

    /// The local tier.
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// Returns the cached value for `fetch`, computing it on a miss.
    pub async fn fetch<F: Fetch>(&self, fetch: F) -> Result<F::Value> {
        let key = fetch.cache_key();

        if let Some(bytes) = self.local.get(&key).await {
            tracing::debug!("✅ Local cache hit for {}", key);
            return Ok(sonic_rs::from_slice(&bytes)?);
        }

        if !fetch.remote_caching() {
            return self.compute_locally(&key, &fetch).await;
        }

        match self.read_remote::<F::Value>(&key).await {
            Ok(Some((value, plaintext))) => {
                tracing::debug!("✅ Remote cache hit for {}", key);
                self.local.set(&key, plaintext, fetch.local_ttl()).await;
                return Ok(value);
            }
            Ok(None) => {}
            Err(BrokerError::RemoteCacheUnavailable(reason)) if self.fail_open => {
                tracing::warn!(
                    "⚠️  Remote cache unavailable, computing {} locally: {}",
                    key,
                    reason
                );
                return self.compute_locally(&key, &fetch).await;
            }
            Err(e) => return Err(e),
        }

        // The locked section runs on its own task: a caller that goes away
        // must not interrupt the holder.
        let this = self.clone();
        tokio::spawn(async move { this.fill_under_lock(key, fetch).await })
            .await
            .map_err(|e| BrokerError::Internal(format!("Cache fill task failed: {}", e)))?
    }

    async fn compute_locally<F: Fetch>(&self, key: &str, fetch: &F) -> Result<F::Value> {
        let value = fetch.compute().await?;
        let plaintext = sonic_rs::to_vec(&value)?;
        self.local.set(key, plaintext, fetch.local_ttl()).await;
        Ok(value)
    }

    async fn fill_under_lock<F: Fetch>(&self, key: String, fetch: F) -> Result<F::Value> {
        let lock_name = format!("{}_lock", key);
        let lock = self.remote.acquire_lock(&lock_name).await?;

        let outcome = self.fill_locked(&key, &fetch).await;

        if let Err(e) = lock.release().await {
            tracing::error!("❌ Failed to release lock {}: {}", lock_name, e);
        }

        let (value, plaintext) = outcome?;
        self.local.set(&key, plaintext, fetch.local_ttl()).await;
        Ok(value)
    }

    /// Runs with the lock held. Must not return before the caller releases it.
    async fn fill_locked<F: Fetch>(&self, key: &str, fetch: &F) -> Result<(F::Value, Vec<u8>)> {
        // Another holder may have filled the key while we waited.
        if let Some(hit) = self.read_remote::<F::Value>(key).await? {
            tracing::debug!("✅ Remote cache filled by another holder for {}", key);
            return Ok(hit);
        }

        tracing::debug!("🔄 Computing value for {}", key);
        let value = fetch.compute().await?;
        let plaintext = sonic_rs::to_vec(&value)?;
        let ciphertext = self.encryption.encrypt(&self.key_id, &plaintext).await?;
        self.remote.set(key, &ciphertext, fetch.remote_ttl()).await?;
        Ok((value, plaintext))
    }

    async fn read_remote<V: DeserializeOwned>(&self, key: &str) -> Result<Option<(V, Vec<u8>)>> {
        let Some(ciphertext) = self.remote.get(key).await? else {
            return Ok(None);
        };
        let plaintext = self.encryption.decrypt(&self.key_id, &ciphertext).await?;
        let value = sonic_rs::from_slice(&plaintext)?;
        Ok(Some((value, plaintext)))
    }
}

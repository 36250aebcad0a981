use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// A cached value and the instant it stops being served.
#[derive(Clone)]
struct LocalEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Process-local, time-expiring key/value store.
///
/// Holds plaintext values; it never leaves the process.
#[derive(Clone, Default)]
pub struct LocalCache {
    entries: Arc<RwLock<HashMap<String, LocalEntry>>>,
}

impl LocalCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key` unless it is absent or expired.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key`; `None` keeps it for the life of the process.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let entry = LocalEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Removes `key` unconditionally.
    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Drops every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = LocalCache::new();
        assert!(cache.get("k").await.is_none());

        cache.set("k", b"v".to_vec(), None).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));

        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_purged_on_read() {
        let cache = LocalCache::new();
        cache.set("k", b"v".to_vec(), Some(Duration::from_millis(20))).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_served() {
        let cache = LocalCache::new();
        cache.set("k", b"v".to_vec(), Some(Duration::ZERO)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = LocalCache::new();
        cache.set("short", b"1".to_vec(), Some(Duration::from_millis(10))).await;
        cache.set("forever", b"2".to_vec(), None).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.get("forever").await, Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let cache = LocalCache::new();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set(&format!("k{}", i), vec![i as u8], None).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len().await, 32);
        assert_eq!(cache.get("k7").await, Some(vec![7]));
    }
}

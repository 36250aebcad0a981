use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::cache::remote::{RemoteCache, RemoteLock};
use crate::error::Result;

type LockTable = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Remote-cache backend living inside the process.
///
/// Locks are FIFO-fair (`tokio::sync::Mutex` queues waiters in order), so
/// concurrent seekers are each served in turn.
#[derive(Clone, Default)]
pub struct MemoryRemoteCache {
    values: Arc<RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>>,
    locks: LockTable,
}

impl MemoryRemoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock names currently tracked.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RemoteCache for MemoryRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let values = self.values.read().await;
        Ok(values
            .get(key)
            .filter(|(_, expires_at)| expires_at.is_none_or(|at| now < at))
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut values = self.values.write().await;
        values.retain(|_, (_, at)| at.is_none_or(|at| Instant::now() < at));
        values.insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn acquire_lock(&self, name: &str) -> Result<Box<dyn RemoteLock>> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = mutex.clone().lock_owned().await;
        tracing::debug!("🔒 Acquired lock {}", name);

        Ok(Box::new(MemoryLock {
            name: name.to_string(),
            mutex,
            guard,
            locks: self.locks.clone(),
        }))
    }
}

struct MemoryLock {
    name: String,
    mutex: Arc<Mutex<()>>,
    guard: OwnedMutexGuard<()>,
    locks: LockTable,
}

#[async_trait]
impl RemoteLock for MemoryLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let MemoryLock {
            name,
            mutex,
            guard,
            locks,
        } = *self;
        drop(guard);

        let mut locks = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Table entry + our handle: nobody else is waiting.
        if Arc::strong_count(&mutex) == 2 {
            locks.remove(&name);
        }
        tracing::debug!("🔓 Released lock {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_expire() {
        let cache = MemoryRemoteCache::new();
        cache.set("a", b"1", Some(Duration::from_millis(20))).await.unwrap();
        cache.set("b", b"2", None).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(b"2".to_vec()));

        cache.delete("b").await.unwrap();
        assert_eq!(cache.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lock_table_is_cleaned_up() {
        let cache = MemoryRemoteCache::new();
        let lock = cache.acquire_lock("k_lock").await.unwrap();
        assert_eq!(cache.tracked_locks(), 1);
        lock.release().await.unwrap();
        assert_eq!(cache.tracked_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_holders_do_not_interleave() {
        let cache = MemoryRemoteCache::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tasks: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|who| {
                let cache = cache.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let lock = cache.acquire_lock("shared_lock").await.unwrap();
                    log.lock().unwrap().push(format!("{} start", who));
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    log.lock().unwrap().push(format!("{} end", who));
                    lock.release().await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 4);
        let who = log[0].split(' ').next().unwrap().to_string();
        assert_eq!(log[1], format!("{} end", who));
        assert!(log[2].ends_with("start"));
        assert!(log[3].ends_with("end"));
        assert_ne!(log[2].split(' ').next().unwrap(), who);
    }
}

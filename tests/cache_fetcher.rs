use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Notify;

use token_broker::cache::fetcher::{CacheFetcher, Fetch};
use token_broker::cache::local::LocalCache;
use token_broker::cache::memory::MemoryRemoteCache;
use token_broker::cache::remote::{RemoteCache, RemoteLock};
use token_broker::crypto::envelope::AeadEnvelopeBackend;
use token_broker::error::{BrokerError, Result};

/// A remote cache that can be switched into a failing state.
#[derive(Clone, Default)]
struct FlakyRemote {
    inner: MemoryRemoteCache,
    broken: Arc<AtomicBool>,
}

impl FlakyRemote {
    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(BrokerError::RemoteCacheUnavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteCache for FlakyRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn acquire_lock(&self, name: &str) -> Result<Box<dyn RemoteLock>> {
        self.check()?;
        self.inner.acquire_lock(name).await
    }
}

struct SlowCount {
    key: String,
    calls: Arc<AtomicUsize>,
    started: Option<Arc<Notify>>,
    delay: Duration,
}

#[async_trait]
impl Fetch for SlowCount {
    type Value = String;

    fn cache_key(&self) -> String {
        self.key.clone()
    }

    fn local_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    fn remote_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }

    async fn compute(&self) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(started) = &self.started {
            started.notify_one();
        }
        tokio::time::sleep(self.delay).await;
        Ok(format!("token-{}", n))
    }
}

fn slow(key: &str, calls: &Arc<AtomicUsize>) -> SlowCount {
    SlowCount {
        key: key.to_string(),
        calls: calls.clone(),
        started: None,
        delay: Duration::from_millis(50),
    }
}

fn instance(remote: Arc<dyn RemoteCache>, fail_open: bool) -> CacheFetcher {
    CacheFetcher::new(
        LocalCache::new(),
        remote,
        Arc::new(AeadEnvelopeBackend::new(&[5u8; 32]).unwrap()),
        "broker-cache",
        fail_open,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_fetches_compute_once_across_instances() {
    let remote: Arc<dyn RemoteCache> = Arc::new(MemoryRemoteCache::new());
    let instances: Vec<CacheFetcher> = (0..4).map(|_| instance(remote.clone(), false)).collect();
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks = (0..32).map(|i| {
        let fetcher = instances[i % instances.len()].clone();
        let fetch = slow("access-token-alice", &calls);
        tokio::spawn(async move { fetcher.fetch(fetch).await })
    });

    let results: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 32);
    assert!(results.iter().all(|value| value == "token-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_compute_independently() {
    let fetcher = instance(Arc::new(MemoryRemoteCache::new()), false);
    let calls = Arc::new(AtomicUsize::new(0));

    let results = join_all(
        ["a", "b", "c"]
            .into_iter()
            .map(|key| fetcher.fetch(slow(key, &calls))),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn local_hit_survives_broken_remote() {
    let remote = FlakyRemote::default();
    let fetcher = instance(Arc::new(remote.clone()), false);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(fetcher.fetch(slow("k", &calls)).await.unwrap(), "token-1");

    remote.broken.store(true, Ordering::SeqCst);
    assert_eq!(fetcher.fetch(slow("k", &calls)).await.unwrap(), "token-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broken_remote_fails_request_by_default() {
    let remote = FlakyRemote::default();
    remote.broken.store(true, Ordering::SeqCst);
    let fetcher = instance(Arc::new(remote), false);
    let calls = Arc::new(AtomicUsize::new(0));

    assert!(matches!(
        fetcher.fetch(slow("k", &calls)).await,
        Err(BrokerError::RemoteCacheUnavailable(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn broken_remote_degrades_when_fail_open() {
    let remote = FlakyRemote::default();
    remote.broken.store(true, Ordering::SeqCst);
    let fetcher = instance(Arc::new(remote.clone()), true);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(fetcher.fetch(slow("k", &calls)).await.unwrap(), "token-1");
    assert_eq!(fetcher.fetch(slow("k", &calls)).await.unwrap(), "token-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    remote.broken.store(false, Ordering::SeqCst);
    assert!(remote.inner.get("k").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_fetch_still_fills_cache() {
    let remote = MemoryRemoteCache::new();
    let fetcher = instance(Arc::new(remote.clone()), false);
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());

    let mut fetch = slow("k", &calls);
    fetch.started = Some(started.clone());
    fetch.delay = Duration::from_millis(100);

    let caller = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.fetch(fetch).await })
    };
    started.notified().await;
    caller.abort();

    let mut filled = false;
    for _ in 0..50 {
        if remote.get("k").await.unwrap().is_some() {
            filled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(filled, "holder should finish after the caller went away");

    assert_eq!(fetcher.fetch(slow("k", &calls)).await.unwrap(), "token-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

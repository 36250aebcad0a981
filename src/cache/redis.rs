use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::remote::{RemoteCache, RemoteLock};
use crate::error::Result;

/// Deletes the lock only if it still carries the holder's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Extends the lease only while the lock still carries the holder's token.
const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const MIN_RETRY_DELAY_MS: u64 = 5;
const MAX_RETRY_DELAY_MS: u64 = 100;

/// Remote-cache backend shared by every broker instance through Redis.
#[derive(Clone)]
pub struct RedisRemoteCache {
    redis: ConnectionManager,
    lock_lease: Duration,
}

impl RedisRemoteCache {
    /// Wraps a connection manager; `lock_lease` bounds how long a crashed holder blocks others.
    pub fn new(redis: ConnectionManager, lock_lease: Duration) -> Self {
        Self { redis, lock_lease }
    }

    /// Connects to `redis_url`.
    pub async fn connect(redis_url: &str, lock_lease: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");
        Ok(Self::new(redis, lock_lease))
    }
}

#[async_trait]
impl RemoteCache for RedisRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut redis = self.redis.clone();
        let value: Option<Vec<u8>> = redis.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut redis = self.redis.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut redis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(key).await?;
        Ok(())
    }

    async fn acquire_lock(&self, name: &str) -> Result<Box<dyn RemoteLock>> {
        let mut redis = self.redis.clone();
        let token = Uuid::new_v4().to_string();
        let lease_ms = self.lock_lease.as_millis().max(1) as u64;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(name)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(lease_ms)
                .query_async(&mut redis)
                .await?;

            if acquired.is_some() {
                tracing::debug!("🔒 Acquired lock {}", name);
                let watchdog = tokio::spawn(keep_alive(
                    redis.clone(),
                    name.to_string(),
                    token.clone(),
                    self.lock_lease,
                ));
                return Ok(Box::new(RedisLock {
                    redis,
                    name: name.to_string(),
                    token,
                    watchdog,
                }));
            }

            // Randomized backoff so waiters do not retry in lockstep.
            let delay = rand::thread_rng().gen_range(MIN_RETRY_DELAY_MS..=MAX_RETRY_DELAY_MS);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// How often a held lock's lease is extended.
fn renewal_interval(lease: Duration) -> Duration {
    (lease / 3).max(Duration::from_millis(1))
}

/// Re-extends the lease of a held lock until aborted or the lock is lost.
async fn keep_alive(mut redis: ConnectionManager, name: String, token: String, lease: Duration) {
    let lease_ms = lease.as_millis().max(1) as u64;
    let script = redis::Script::new(EXTEND_SCRIPT);
    let mut ticker = tokio::time::interval(renewal_interval(lease));
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let extended: std::result::Result<i64, redis::RedisError> = script
            .key(&name)
            .arg(&token)
            .arg(lease_ms)
            .invoke_async(&mut redis)
            .await;

        match extended {
            Ok(1) => tracing::trace!("🔒 Extended lease of lock {}", name),
            Ok(_) => {
                tracing::error!("❌ Lock {} was lost while held", name);
                return;
            }
            Err(e) => tracing::warn!("⚠️  Failed to extend lease of lock {}: {}", name, e),
        }
    }
}

struct RedisLock {
    redis: ConnectionManager,
    name: String,
    token: String,
    watchdog: JoinHandle<()>,
}

impl Drop for RedisLock {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}

#[async_trait]
impl RemoteLock for RedisLock {
    async fn release(self: Box<Self>) -> Result<()> {
        self.watchdog.abort();

        let mut redis = self.redis.clone();
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.name)
            .arg(&self.token)
            .invoke_async(&mut redis)
            .await?;

        if released == 0 {
            tracing::warn!("⚠️  Lock {} lease expired before release", self.name);
        } else {
            tracing::debug!("🔓 Released lock {}", self.name);
        }
        Ok(())
    }
}

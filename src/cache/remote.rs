use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Shared cache visible to every broker instance.
///
/// Backend failures surface as `BrokerError::RemoteCacheUnavailable`.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value`; `None` keeps it until explicitly deleted.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Waits until the named lock is held by the caller.
    async fn acquire_lock(&self, name: &str) -> Result<Box<dyn RemoteLock>>;
}

/// A held lock from [`RemoteCache::acquire_lock`].
#[async_trait]
pub trait RemoteLock: Send {
    /// Gives the lock back.
    async fn release(self: Box<Self>) -> Result<()>;
}

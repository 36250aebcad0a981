use std::sync::Arc;

use crate::cache::fetcher::CacheFetcher;
use crate::cache::local::LocalCache;
use crate::cache::memory::MemoryRemoteCache;
use crate::cache::redis::RedisRemoteCache;
use crate::cache::remote::RemoteCache;
use crate::config::{Config, DatabaseBackend, ProviderBackend, RemoteCacheBackend};
use crate::crypto::envelope::{AeadEnvelopeBackend, EncryptionBackend};
use crate::crypto::session_token::SessionTokenCodec;
use crate::error::{BrokerError, Result};
use crate::providers::{AccessTokenProvider, DevelopmentProvider};
use crate::repositories::memory::MemoryDatabase;
use crate::repositories::postgres::PostgresDatabase;
use crate::repositories::store::{Database, ModelStore};

/// The broker's backends, built once at startup and shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// The broker's configuration.
    pub config: Arc<Config>,
    /// Persistent object store holding sessions.
    pub store: ModelStore,
    /// Two-tier cache-aside engine.
    pub fetcher: CacheFetcher,
    /// Session token codec.
    pub session_tokens: SessionTokenCodec,
    /// Issues access tokens for cloud identities.
    pub provider: Arc<dyn AccessTokenProvider>,
}

impl AppState {
    /// Creates the `AppState` with the backends selected by `config`.
    pub async fn new(config: &Config) -> Result<Self> {
        let database: Arc<dyn Database> = match config.database_backend {
            DatabaseBackend::Memory => {
                tracing::info!("✅ In-memory object store initialized");
                Arc::new(MemoryDatabase::new())
            }
            DatabaseBackend::Postgres => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    BrokerError::Internal("DATABASE_URL is not configured".to_string())
                })?;
                let pool = crate::db::create_pool(url, config.database_pool_size)?;
                crate::db::ensure_schema(&pool).await?;
                tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");
                Arc::new(PostgresDatabase::new(pool))
            }
        };

        let remote: Arc<dyn RemoteCache> = match config.remote_cache_backend {
            RemoteCacheBackend::Memory => {
                tracing::info!("✅ In-memory remote cache initialized");
                Arc::new(MemoryRemoteCache::new())
            }
            RemoteCacheBackend::Redis => Arc::new(
                RedisRemoteCache::connect(&config.redis_url, config.redis_lock_lease).await?,
            ),
        };

        let encryption: Arc<dyn EncryptionBackend> =
            Arc::new(AeadEnvelopeBackend::new(&config.master_key)?);
        tracing::info!("✅ Envelope encryption backend initialized");

        let provider: Arc<dyn AccessTokenProvider> = match config.provider_backend {
            ProviderBackend::Development => {
                tracing::warn!("⚠️  Using the development access-token provider");
                Arc::new(DevelopmentProvider::new(
                    config.provider_token_lifetime,
                    config.provider_denied_identities.clone(),
                ))
            }
        };

        Ok(Self::with_backends(
            config.clone(),
            database,
            remote,
            encryption,
            provider,
        ))
    }

    /// Wires an `AppState` from already constructed backends.
    pub fn with_backends(
        config: Config,
        database: Arc<dyn Database>,
        remote: Arc<dyn RemoteCache>,
        encryption: Arc<dyn EncryptionBackend>,
        provider: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        let store = ModelStore::new(database);

        let fetcher = CacheFetcher::new(
            LocalCache::new(),
            remote,
            encryption.clone(),
            config.cache_key_id.clone(),
            config.remote_cache_fail_open,
        );

        let session_tokens = SessionTokenCodec::new(
            encryption,
            config.session_token_key_id.clone(),
            store.clone(),
        );

        Self {
            config: Arc::new(config),
            store,
            fetcher,
            session_tokens,
            provider,
        }
    }
}

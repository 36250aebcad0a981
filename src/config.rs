use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::models::session::SessionLifetime;

/// Which persistent object store backs sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseBackend {
    Memory,
    Postgres,
}

/// Which shared cache backs the remote tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteCacheBackend {
    Memory,
    Redis,
}

/// Which identity provider issues access tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderBackend {
    Development,
}

/// The broker's configuration.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP surface listens on.
    pub server_addr: SocketAddr,
    pub database_backend: DatabaseBackend,
    /// The URL of the PostgreSQL database.
    pub database_url: Option<String>,
    pub database_pool_size: usize,
    pub remote_cache_backend: RemoteCacheBackend,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// How long a Redis lock survives a crashed holder.
    pub redis_lock_lease: Duration,
    /// Degrade to local-only caching when the remote tier is unreachable.
    pub remote_cache_fail_open: bool,
    /// The master key all KEKs are derived from.
    pub master_key: Zeroizing<Vec<u8>>,
    /// Key id protecting values in the remote cache.
    pub cache_key_id: String,
    /// Key id protecting session passwords inside session tokens.
    pub session_token_key_id: String,
    pub session_lifetime: SessionLifetime,
    pub session_local_cache_time: Duration,
    pub access_token_local_cache_time: Duration,
    pub access_token_remote_cache_time: Duration,
    pub session_cleanup_interval: Duration,
    pub session_cleanup_batch_limit: i64,
    /// Principals allowed to act on behalf of any owner.
    pub proxy_users: Vec<String>,
    pub allowed_scopes: Vec<String>,
    /// Domain appended to the short name of a Kerberos principal.
    pub user_mapping_domain: Option<String>,
    /// Header carrying the principal authenticated by the SPNEGO front end.
    pub auth_principal_header: String,
    pub provider_backend: ProviderBackend,
    pub provider_token_lifetime: Duration,
    pub provider_denied_identities: Vec<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Creates a new `Config` from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mut master_key_hex = lookup("ENCRYPTION_MASTER_KEY").context(
            "ENCRYPTION_MASTER_KEY must be set (generate with: openssl rand -hex 32)",
        )?;

        let master_key_bytes = hex::decode(master_key_hex.trim())
            .context("ENCRYPTION_MASTER_KEY must be valid hexadecimal")?;

        master_key_hex.zeroize();

        if master_key_bytes.len() != 32 {
            anyhow::bail!("ENCRYPTION_MASTER_KEY must be exactly 32 bytes (64 hex characters)");
        }

        let database_backend = match get("DATABASE_BACKEND", "memory").as_str() {
            "memory" => DatabaseBackend::Memory,
            "postgres" => DatabaseBackend::Postgres,
            other => anyhow::bail!("Unknown DATABASE_BACKEND: {}", other),
        };
        let database_url = lookup("DATABASE_URL");
        if database_backend == DatabaseBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when DATABASE_BACKEND=postgres");
        }

        let remote_cache_backend = match get("REMOTE_CACHE_BACKEND", "memory").as_str() {
            "memory" => RemoteCacheBackend::Memory,
            "redis" => RemoteCacheBackend::Redis,
            other => anyhow::bail!("Unknown REMOTE_CACHE_BACKEND: {}", other),
        };

        let provider_backend = match get("PROVIDER_BACKEND", "development").as_str() {
            "development" => ProviderBackend::Development,
            other => anyhow::bail!("Unknown PROVIDER_BACKEND: {}", other),
        };

        let renew_period_ms: i64 = get("SESSION_RENEW_PERIOD_MS", "86400000")
            .parse()
            .context("Invalid SESSION_RENEW_PERIOD_MS")?;
        let maximum_lifetime_ms: i64 = get("SESSION_MAXIMUM_LIFETIME_MS", "604800000")
            .parse()
            .context("Invalid SESSION_MAXIMUM_LIFETIME_MS")?;
        if renew_period_ms <= 0 || maximum_lifetime_ms < renew_period_ms {
            anyhow::bail!(
                "SESSION_MAXIMUM_LIFETIME_MS must be >= SESSION_RENEW_PERIOD_MS and both positive"
            );
        }

        Ok(Self {
            server_addr: get("SERVER_ADDR", "127.0.0.1:8080")
                .parse()
                .context("Invalid SERVER_ADDR")?,
            database_backend,
            database_url,
            database_pool_size: get("DATABASE_POOL_SIZE", "16")
                .parse()
                .context("Invalid DATABASE_POOL_SIZE")?,
            remote_cache_backend,
            redis_url: get("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_lock_lease: Duration::from_millis(
                get("REDIS_LOCK_LEASE_MS", "30000")
                    .parse()
                    .context("Invalid REDIS_LOCK_LEASE_MS")?,
            ),
            remote_cache_fail_open: parse_bool(&get("REMOTE_CACHE_FAIL_OPEN", "false"))
                .context("Invalid REMOTE_CACHE_FAIL_OPEN")?,
            master_key: Zeroizing::new(master_key_bytes),
            cache_key_id: get("ENCRYPTION_CACHE_KEY_ID", "broker-cache"),
            session_token_key_id: get("ENCRYPTION_SESSION_TOKEN_KEY_ID", "broker-session-token"),
            session_lifetime: SessionLifetime {
                renew_period_ms,
                maximum_lifetime_ms,
            },
            session_local_cache_time: secs(&get("SESSION_LOCAL_CACHE_TIME_SECS", "30"))
                .context("Invalid SESSION_LOCAL_CACHE_TIME_SECS")?,
            access_token_local_cache_time: secs(&get("ACCESS_TOKEN_LOCAL_CACHE_TIME_SECS", "30"))
                .context("Invalid ACCESS_TOKEN_LOCAL_CACHE_TIME_SECS")?,
            access_token_remote_cache_time: secs(&get(
                "ACCESS_TOKEN_REMOTE_CACHE_TIME_SECS",
                "60",
            ))
            .context("Invalid ACCESS_TOKEN_REMOTE_CACHE_TIME_SECS")?,
            session_cleanup_interval: secs(&get("SESSION_CLEANUP_INTERVAL_SECS", "3600"))
                .context("Invalid SESSION_CLEANUP_INTERVAL_SECS")?,
            session_cleanup_batch_limit: get("SESSION_CLEANUP_BATCH_LIMIT", "500")
                .parse()
                .context("Invalid SESSION_CLEANUP_BATCH_LIMIT")?,
            proxy_users: list(&get("PROXY_USERS", "")),
            allowed_scopes: list(&get(
                "ALLOWED_SCOPES",
                "https://www.googleapis.com/auth/devstorage.read_write",
            )),
            user_mapping_domain: lookup("USER_MAPPING_DOMAIN").filter(|d| !d.trim().is_empty()),
            auth_principal_header: get("AUTH_PRINCIPAL_HEADER", "x-authenticated-principal")
                .to_ascii_lowercase(),
            provider_backend,
            provider_token_lifetime: secs(&get("PROVIDER_TOKEN_LIFETIME_SECS", "3600"))
                .context("Invalid PROVIDER_TOKEN_LIFETIME_SECS")?,
            provider_denied_identities: list(&get("PROVIDER_DENIED_IDENTITIES", "")),
        })
    }
}

fn secs(value: &str) -> Result<Duration> {
    Ok(Duration::from_secs(value.trim().parse()?))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {}", other),
    }
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

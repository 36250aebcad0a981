use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::fetcher::Fetch;
use crate::error::{BrokerError, Result};
use crate::models::access_token::AccessToken;
use crate::providers::AccessTokenProvider;
use crate::services::auth::{authenticate_session, authorize_impersonation, map_identity, Caller};
use crate::state::AppState;
use crate::validation::broker::{require_non_empty, validate_scopes};

/// Fetches an access token from the provider, shared through both cache tiers.
struct AccessTokenFetch {
    key: String,
    scopes: Vec<String>,
    identity: String,
    provider: Arc<dyn AccessTokenProvider>,
    local_ttl: Duration,
    remote_ttl: Duration,
}

#[async_trait]
impl Fetch for AccessTokenFetch {
    type Value = AccessToken;

    fn cache_key(&self) -> String {
        self.key.clone()
    }

    fn local_ttl(&self) -> Option<Duration> {
        Some(self.local_ttl)
    }

    fn remote_ttl(&self) -> Option<Duration> {
        Some(self.remote_ttl)
    }

    async fn compute(&self) -> Result<AccessToken> {
        self.provider
            .get_access_token(&self.identity, &self.scopes)
            .await
    }
}

/// Cache key for a token of `owner` on `target` with `scopes`.
///
/// The fields are JSON-encoded so no choice of values can collide.
fn access_token_cache_key(owner: &str, scopes: &[String], target: &str) -> Result<String> {
    Ok(format!(
        "access-token-{}",
        sonic_rs::to_string(&(owner, scopes, target))?
    ))
}

/// Returns an access token for `owner` on `target` with `scopes`.
///
/// Kerberos callers must be the owner or a proxy user. Session callers are
/// limited to the owner, target and scopes of their session.
pub async fn get_access_token(
    state: &AppState,
    caller: &Caller,
    owner: &str,
    scopes: &[String],
    target: &str,
) -> Result<AccessToken> {
    require_non_empty("owner", owner)?;
    require_non_empty("target", target)?;
    validate_scopes(scopes, &state.config.allowed_scopes)?;

    match caller {
        Caller::Principal(principal) => {
            authorize_impersonation(&state.config.proxy_users, principal, owner)?;
        }
        Caller::Session(token) => {
            let session = authenticate_session(state, token).await?;
            if session.owner != owner {
                return Err(BrokerError::PermissionDenied(format!(
                    "session {} does not belong to {}",
                    session.id, owner
                )));
            }
            if session.target != target {
                return Err(BrokerError::PermissionDenied(format!(
                    "target {} does not match session {}",
                    target, session.id
                )));
            }
            if let Some(scope) = scopes.iter().find(|s| !session.scopes.contains(*s)) {
                return Err(BrokerError::PermissionDenied(format!(
                    "scope {} is not granted by session {}",
                    scope, session.id
                )));
            }
        }
    }

    let token = state
        .fetcher
        .fetch(AccessTokenFetch {
            key: access_token_cache_key(owner, scopes, target)?,
            scopes: scopes.to_vec(),
            identity: map_identity(owner, state.config.user_mapping_domain.as_deref()),
            provider: state.provider.clone(),
            local_ttl: state.config.access_token_local_cache_time,
            remote_ttl: state.config.access_token_remote_cache_time,
        })
        .await?;

    tracing::info!("✅ Access token served for {} on {}", owner, target);
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_separates_fields() {
        let a = access_token_cache_key("a-b", &["s".to_string()], "t").unwrap();
        let b = access_token_cache_key("a", &["b-s".to_string()], "t").unwrap();
        let c = access_token_cache_key("a", &["b".to_string(), "s".to_string()], "t").unwrap();
        let d = access_token_cache_key("a", &["b,s".to_string()], "t").unwrap();
        assert_ne!(a, b);
        assert_ne!(c, d);
        assert_eq!(
            a,
            access_token_cache_key("a-b", &["s".to_string()], "t").unwrap()
        );
    }
}

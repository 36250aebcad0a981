use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BrokerError, Result};
use crate::models::access_token::AccessToken;
use crate::models::session::now_millis;

/// Issues access tokens for cloud identities.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Requests a token for `identity` limited to `scopes`.
    ///
    /// Fails with `BrokerError::PermissionDenied` when the provider refuses.
    async fn get_access_token(&self, identity: &str, scopes: &[String]) -> Result<AccessToken>;
}

/// Provider for development and tests: issues opaque, self-describing tokens.
#[derive(Clone, Debug)]
pub struct DevelopmentProvider {
    lifetime: Duration,
    denied_identities: Vec<String>,
}

impl DevelopmentProvider {
    pub fn new(lifetime: Duration, denied_identities: Vec<String>) -> Self {
        Self {
            lifetime,
            denied_identities,
        }
    }
}

#[async_trait]
impl AccessTokenProvider for DevelopmentProvider {
    async fn get_access_token(&self, identity: &str, scopes: &[String]) -> Result<AccessToken> {
        if self.denied_identities.iter().any(|denied| denied == identity) {
            return Err(BrokerError::PermissionDenied(format!(
                "provider refused to issue a token for {}",
                identity
            )));
        }

        tracing::info!("🔑 Issuing development access token for {}", identity);
        Ok(AccessToken {
            value: format!(
                "DevelopmentAccessToken/Identity={};Scopes={};Nonce={}",
                identity,
                scopes.join(","),
                uuid::Uuid::new_v4().simple()
            ),
            expires_at: now_millis() + self.lifetime.as_millis() as i64,
        })
    }
}

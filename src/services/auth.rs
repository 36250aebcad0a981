use std::time::Duration;

use async_trait::async_trait;

use crate::cache::fetcher::Fetch;
use crate::crypto::session_token::SessionTokenCodec;
use crate::error::{BrokerError, Result};
use crate::models::session::Session;
use crate::state::AppState;

/// Who is calling, as established by the authentication middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    /// A Kerberos principal authenticated by the SPNEGO front end.
    Principal(String),
    /// A holder of a session token.
    Session(String),
}

impl Caller {
    /// The Kerberos principal, or `Unauthenticated` for session-token callers.
    pub fn principal(&self) -> Result<&str> {
        match self {
            Caller::Principal(principal) => Ok(principal),
            Caller::Session(_) => Err(BrokerError::Unauthenticated(
                "this operation requires Kerberos authentication".to_string(),
            )),
        }
    }
}

/// Checks that `principal` may act on behalf of `owner`.
///
/// Principals may always act for themselves; proxy users may act for anyone.
pub fn authorize_impersonation(proxy_users: &[String], principal: &str, owner: &str) -> Result<()> {
    if principal == owner || proxy_users.iter().any(|p| p == principal) {
        return Ok(());
    }

    Err(BrokerError::PermissionDenied(format!(
        "{} is not allowed to impersonate {}",
        principal, owner
    )))
}

/// Maps a Kerberos principal to a cloud identity.
///
/// `alice/host@EXAMPLE.COM` becomes `alice@<domain>`; without a domain the
/// principal is used as is.
pub fn map_identity(principal: &str, domain: Option<&str>) -> String {
    match domain {
        Some(domain) => {
            let short = principal
                .split(['/', '@'])
                .next()
                .unwrap_or(principal);
            format!("{}@{}", short, domain)
        }
        None => principal.to_string(),
    }
}

/// Resolves a session from its raw token, cached in this process only.
struct SessionFetch {
    token: String,
    codec: SessionTokenCodec,
    local_ttl: Duration,
}

#[async_trait]
impl Fetch for SessionFetch {
    type Value = Session;

    fn cache_key(&self) -> String {
        session_cache_key(&self.token)
    }

    fn local_ttl(&self) -> Option<Duration> {
        Some(self.local_ttl)
    }

    fn remote_ttl(&self) -> Option<Duration> {
        None
    }

    // The key embeds the raw token.
    fn remote_caching(&self) -> bool {
        false
    }

    async fn compute(&self) -> Result<Session> {
        self.codec.resolve(&self.token).await
    }
}

/// Cache key under which a session token's session is held locally.
pub fn session_cache_key(token: &str) -> String {
    format!("session-{}", token)
}

/// Authenticates a session-token caller, rejecting expired sessions.
pub async fn authenticate_session(state: &AppState, token: &str) -> Result<Session> {
    let session = state
        .fetcher
        .fetch(SessionFetch {
            token: token.to_string(),
            codec: state.session_tokens.clone(),
            local_ttl: state.config.session_local_cache_time,
        })
        .await?;

    if session.is_expired() {
        tracing::warn!("❌ Session {} expired", session.id);
        return Err(BrokerError::Unauthenticated(format!(
            "session {} expired",
            session.id
        )));
    }

    tracing::debug!("✅ Session {} authenticated for {}", session.id, session.owner);
    Ok(session)
}

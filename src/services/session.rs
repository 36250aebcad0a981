use crate::error::{BrokerError, Result};
use crate::models::session::{now_millis, Session};
use crate::services::auth::{authorize_impersonation, session_cache_key, Caller};
use crate::state::AppState;
use crate::validation::broker::{require_non_empty, validate_scopes};

/// A freshly issued session token.
#[derive(Debug)]
pub struct IssuedSession {
    pub session_token: String,
    pub expires_at: i64,
}

/// Creates a session delegating `owner`'s access to `renewer` and returns its token.
pub async fn create_session_token(
    state: &AppState,
    caller: &Caller,
    owner: &str,
    renewer: &str,
    scopes: &[String],
    target: &str,
) -> Result<IssuedSession> {
    let principal = caller.principal()?;
    require_non_empty("owner", owner)?;
    require_non_empty("renewer", renewer)?;
    require_non_empty("target", target)?;
    validate_scopes(scopes, &state.config.allowed_scopes)?;
    authorize_impersonation(&state.config.proxy_users, principal, owner)?;

    let session = Session::new(
        owner,
        renewer,
        target,
        scopes.to_vec(),
        &state.config.session_lifetime,
        now_millis(),
    );
    state.store.save(&session).await?;

    let session_token = state.session_tokens.marshall(&session).await?;
    tracing::info!(
        "✅ Session {} created for {} (renewer {})",
        session.id,
        session.owner,
        session.renewer
    );

    Ok(IssuedSession {
        session_token,
        expires_at: session.expires_at,
    })
}

/// Loads the session behind `token` for its renewer.
async fn session_for_renewer(state: &AppState, caller: &Caller, token: &str) -> Result<Session> {
    let principal = caller.principal()?;
    require_non_empty("session_token", token)?;

    let session = state.session_tokens.resolve(token).await?;
    if session.renewer != principal {
        return Err(BrokerError::PermissionDenied(format!(
            "{} is not the renewer of session {}",
            principal, session.id
        )));
    }
    Ok(session)
}

/// Renews the session behind `token`, returning the new expiry (epoch ms).
pub async fn renew_session_token(state: &AppState, caller: &Caller, token: &str) -> Result<i64> {
    let mut session = session_for_renewer(state, caller, token).await?;

    let now = now_millis();
    if session.is_expired_at(now) {
        tracing::warn!("❌ Refusing to renew expired session {}", session.id);
        return Err(BrokerError::Unauthenticated(format!(
            "session {} expired",
            session.id
        )));
    }

    session.renew(&state.config.session_lifetime, now);
    state.store.save(&session).await?;
    state.fetcher.local().delete(&session_cache_key(token)).await;

    tracing::info!("🔄 Session {} renewed until {}", session.id, session.expires_at);
    Ok(session.expires_at)
}

/// Cancels the session behind `token`.
pub async fn cancel_session_token(state: &AppState, caller: &Caller, token: &str) -> Result<()> {
    let session = session_for_renewer(state, caller, token).await?;

    state.store.delete(&session).await?;
    state.fetcher.local().delete(&session_cache_key(token)).await;

    tracing::info!("🗑️  Session {} cancelled", session.id);
    Ok(())
}

/// Deletes sessions expired as of now, returning how many were removed.
pub async fn cleanup_expired_sessions(state: &AppState) -> Result<u64> {
    let removed = state
        .store
        .delete_expired::<Session>(
            "expires_at",
            now_millis(),
            Some(state.config.session_cleanup_batch_limit),
        )
        .await?;
    let purged = state.fetcher.local().purge_expired().await;

    tracing::info!(
        "🧹 Removed {} expired sessions, purged {} local cache entries",
        removed,
        purged
    );
    Ok(removed)
}

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::{
    error::BrokerError,
    services::auth::Caller,
    state::AppState,
};

/// Authorization scheme carrying a session token.
pub const SESSION_AUTH_SCHEME: &str = "BrokerSession";

/// Extracts the session token from the `Authorization` header.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme == SESSION_AUTH_SCHEME && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}

/// Extracts the principal forwarded by the SPNEGO front end.
fn extract_principal(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|principal| !principal.is_empty())
        .map(str::to_string)
}

/// A middleware that requires an authenticated caller.
///
/// A session token takes precedence over a forwarded principal. The resolved
/// [`Caller`] is stored in the request extensions.
pub async fn require_caller(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, BrokerError> {
    tracing::debug!("🔐 Checking authentication...");

    let headers = request.headers();
    let caller = if let Some(token) = extract_session_token(headers) {
        Caller::Session(token)
    } else if let Some(principal) =
        extract_principal(headers, &state.config.auth_principal_header)
    {
        tracing::debug!("✅ Kerberos principal: {}", principal);
        Caller::Principal(principal)
    } else {
        tracing::warn!("❌ Request carries no credentials");
        return Err(BrokerError::Unauthenticated(
            "no session token or authenticated principal".to_string(),
        ));
    };

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_extract_session_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("BrokerSession abc.def"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn test_extract_principal() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-authenticated-principal",
            HeaderValue::from_static(" alice@EXAMPLE.COM "),
        );
        assert_eq!(
            extract_principal(&headers, "x-authenticated-principal"),
            Some("alice@EXAMPLE.COM".to_string())
        );
        assert_eq!(extract_principal(&headers, "x-other"), None);
    }
}

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{
    error::Result,
    middleware_layer::auth::require_caller,
    services::{access_token, auth::Caller, session},
    state::AppState,
};

/// The request payload for an access token.
#[derive(Deserialize, Debug)]
pub struct AccessTokenRequest {
    pub owner: String,
    pub scopes: Vec<String>,
    pub target: String,
}

/// The response payload carrying an access token.
#[derive(Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_at: i64,
}

/// The request payload for a new session token.
#[derive(Deserialize, Debug)]
pub struct SessionTokenRequest {
    pub owner: String,
    pub renewer: String,
    pub scopes: Vec<String>,
    pub target: String,
}

/// The response payload carrying a session token.
#[derive(Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub session_token: String,
    pub expires_at: i64,
}

/// The request payload naming an existing session token.
#[derive(Deserialize)]
pub struct ExistingSessionRequest {
    pub session_token: String,
}

/// The response payload of a renewal.
#[derive(Serialize, Deserialize)]
pub struct RenewResponse {
    pub expires_at: i64,
}

/// The response payload of a cancellation.
#[derive(Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Builds the broker's router.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/v1/access-token", post(get_access_token))
        .route("/v1/session-token", post(get_session_token))
        .route("/v1/session-token/renew", post(renew_session_token))
        .route("/v1/session-token/cancel", post(cancel_session_token))
        .route_layer(from_fn_with_state(state.clone(), require_caller))
        .with_state(state);

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
}

async fn healthz() -> impl IntoResponse {
    Json(sonic_rs::json!({ "status": "ok" }))
}

/// Handles access-token requests.
pub async fn get_access_token(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<AccessTokenRequest>,
) -> Result<Json<AccessTokenResponse>> {
    tracing::debug!("🔑 Access token request: {:?}", payload);

    let token = access_token::get_access_token(
        &state,
        &caller,
        &payload.owner,
        &payload.scopes,
        &payload.target,
    )
    .await?;

    Ok(Json(AccessTokenResponse {
        access_token: token.value,
        expires_at: token.expires_at,
    }))
}

/// Handles session-token creation.
pub async fn get_session_token(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Json<SessionTokenResponse>> {
    tracing::debug!("📝 Session token request: {:?}", payload);

    let issued = session::create_session_token(
        &state,
        &caller,
        &payload.owner,
        &payload.renewer,
        &payload.scopes,
        &payload.target,
    )
    .await?;

    Ok(Json(SessionTokenResponse {
        session_token: issued.session_token,
        expires_at: issued.expires_at,
    }))
}

/// Handles session-token renewal.
pub async fn renew_session_token(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<ExistingSessionRequest>,
) -> Result<Json<RenewResponse>> {
    let expires_at = session::renew_session_token(&state, &caller, &payload.session_token).await?;
    Ok(Json(RenewResponse { expires_at }))
}

/// Handles session-token cancellation.
pub async fn cancel_session_token(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<ExistingSessionRequest>,
) -> Result<Json<CancelResponse>> {
    session::cancel_session_token(&state, &caller, &payload.session_token).await?;
    Ok(Json(CancelResponse { success: true }))
}

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use token_broker::handlers::broker::{
    router, AccessTokenResponse, CancelResponse, RenewResponse, SessionTokenResponse,
};

use common::SCOPE;

const PRINCIPAL_HEADER: &str = "x-authenticated-principal";

fn post(uri: &str) -> http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn json_body(value: &sonic_rs::Value) -> Body {
    Body::from(sonic_rs::to_string(value).unwrap())
}

#[tokio::test]
async fn healthz_needs_no_credentials() {
    let app = router(common::state(&[]));
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let app = router(common::state(&[]));
    let body = sonic_rs::json!({
        "owner": "alice@EXAMPLE.COM",
        "scopes": [SCOPE],
        "target": "gs://bucket",
    });
    let request = post("/v1/access-token")
        .body(json_body(&body))
        .unwrap();

    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error: sonic_rs::Value = sonic_rs::from_slice(&bytes).unwrap();
    assert!(sonic_rs::JsonValueTrait::get(&error, "error").is_some());
}

#[tokio::test]
async fn impersonation_is_forbidden_over_http() {
    let app = router(common::state(&[]));
    let body = sonic_rs::json!({
        "owner": "alice@EXAMPLE.COM",
        "scopes": [SCOPE],
        "target": "gs://bucket",
    });
    let request = post("/v1/access-token")
        .header(PRINCIPAL_HEADER, "mallory@EXAMPLE.COM")
        .body(json_body(&body))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_token_flow() {
    let app = router(common::state(&[]));

    // A proxy user creates a session for alice, renewable by yarn.
    let body = sonic_rs::json!({
        "owner": "alice@EXAMPLE.COM",
        "renewer": "yarn@EXAMPLE.COM",
        "scopes": [SCOPE],
        "target": "gs://bucket",
    });
    let request = post("/v1/session-token")
        .header(PRINCIPAL_HEADER, "hive@EXAMPLE.COM")
        .body(json_body(&body))
        .unwrap();
    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let issued: SessionTokenResponse = sonic_rs::from_slice(&bytes).unwrap();

    // The session token alone authenticates an access-token request.
    let body = sonic_rs::json!({
        "owner": "alice@EXAMPLE.COM",
        "scopes": [SCOPE],
        "target": "gs://bucket",
    });
    let request = post("/v1/access-token")
        .header(
            header::AUTHORIZATION,
            format!("BrokerSession {}", issued.session_token),
        )
        .body(json_body(&body))
        .unwrap();
    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let token: AccessTokenResponse = sonic_rs::from_slice(&bytes).unwrap();
    assert!(!token.access_token.is_empty());
    assert!(token.expires_at > 0);

    // Renewal by the renewer.
    let body = sonic_rs::json!({ "session_token": issued.session_token.as_str() });
    let request = post("/v1/session-token/renew")
        .header(PRINCIPAL_HEADER, "yarn@EXAMPLE.COM")
        .body(json_body(&body))
        .unwrap();
    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let renewed: RenewResponse = sonic_rs::from_slice(&bytes).unwrap();
    assert!(renewed.expires_at >= issued.expires_at);

    // Cancellation by the renewer.
    let request = post("/v1/session-token/cancel")
        .header(PRINCIPAL_HEADER, "yarn@EXAMPLE.COM")
        .body(json_body(&body))
        .unwrap();
    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let cancelled: CancelResponse = sonic_rs::from_slice(&bytes).unwrap();
    assert!(cancelled.success);

    // A cancelled session no longer renews.
    let request = post("/v1/session-token/renew")
        .header(PRINCIPAL_HEADER, "yarn@EXAMPLE.COM")
        .body(json_body(&body))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_session_token_is_rejected() {
    let app = router(common::state(&[]));
    let body = sonic_rs::json!({
        "owner": "alice@EXAMPLE.COM",
        "scopes": [SCOPE],
        "target": "gs://bucket",
    });
    let request = post("/v1/access-token")
        .header(header::AUTHORIZATION, "BrokerSession not-a-token")
        .body(json_body(&body))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

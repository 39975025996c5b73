//! Authentication flow integration tests
//!
//! Tests the authentication system end to end over a real listener:
//! - Login and token issuance
//! - Bearer-token access to protected routes
//! - Uniform rejection of bad credentials

mod common;

use common::*;
use gatekeeper::auth::RateLimitConfig;
use gatekeeper::error::ErrorBody;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn login(client: &reqwest::Client, addr: std::net::SocketAddr, body: Value) -> reqwest::Response {
    client
        .post(format!("http://{}/api/v1/auth/login", addr))
        .json(&body)
        .send()
        .await
        .unwrap()
}

/// Test 1: Login then call a protected route with the issued token
#[tokio::test]
async fn test_login_then_me() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;
    let client = reqwest::Client::new();

    let response = login(
        &client,
        addr,
        json!({"username": TEST_USERNAME, "password": TEST_PASSWORD}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"], "OK");
    let token = body["data"]["accessToken"].as_str().unwrap().to_string();
    assert!(body["data"]["expiresAt"].is_string());

    let response = client
        .get(format!("http://{}/api/v1/me", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["subject"], TEST_USER_ID);
    assert_eq!(body["data"]["issuer"], "svc");
    assert_eq!(body["data"]["audience"], "api");
}

/// Test 2: Missing header and Basic scheme are rejected with 401
#[tokio::test]
async fn test_me_rejects_missing_and_basic() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("http://{}/api/v1/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let basic = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", "Basic xyz")
        .send()
        .await
        .unwrap();
    assert_eq!(basic.status(), StatusCode::UNAUTHORIZED);

    let missing: ErrorBody = missing.json().await.unwrap();
    let basic: ErrorBody = basic.json().await.unwrap();
    assert_eq!(missing.code, 401001);
    assert_eq!(missing.code, basic.code);
    assert_eq!(missing.message, basic.message);
}

/// Test 3: Token from another authority is rejected
#[tokio::test]
async fn test_me_rejects_foreign_token() {
    use gatekeeper::auth::{SigningStrategy, TokenAuthority};

    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;
    let foreign = TokenAuthority::with_system_clock(
        create_test_policy(),
        SigningStrategy::symmetric("a-different-secret").unwrap(),
    )
    .unwrap();
    let token = foreign.issue(TEST_USER_ID).unwrap().token;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/v1/me", addr))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Test 4: Wrong password and unknown user produce identical responses
#[tokio::test]
async fn test_login_failures_indistinguishable() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;
    let client = reqwest::Client::new();

    let wrong_password = login(
        &client,
        addr,
        json!({"username": TEST_USERNAME, "password": "wrong"}),
    )
    .await;
    let unknown_user = login(
        &client,
        addr,
        json!({"username": "mallory", "password": "wrong"}),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);

    let wrong_password: ErrorBody = wrong_password.json().await.unwrap();
    let unknown_user: ErrorBody = unknown_user.json().await.unwrap();
    assert_eq!(wrong_password.code, unknown_user.code);
    assert_eq!(wrong_password.message, unknown_user.message);
    assert_eq!(wrong_password.details, unknown_user.details);
}

/// Test 5: Request id is echoed in both the header and the error body
#[tokio::test]
async fn test_request_id_round_trip() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/v1/me", addr))
        .header("x-request-id", "trace-abc-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-abc-123"
    );
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.request_id, "trace-abc-123");
}

/// Test 6: Generated request id matches between header and body
#[tokio::test]
async fn test_generated_request_id() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/no/such/route", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let header = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: ErrorBody = response.json().await.unwrap();
    assert!(!header.is_empty());
    assert_eq!(body.request_id, header);
}

/// Test 7: Malformed login payload is bad input with details
#[tokio::test]
async fn test_login_bad_input() {
    let (addr, _shutdown) = run_test_server(create_test_state(RateLimitConfig::default())).await;
    let client = reqwest::Client::new();

    let response = login(&client, addr, json!({"password": "x"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.code, 400001);
    assert_eq!(body.message, "Bad Request");
    assert_eq!(
        body.details.unwrap().get("username").map(String::as_str),
        Some("is required")
    );
}

//! Admission control integration tests
//!
//! Tests the process-wide token bucket in front of the full middleware stack.

mod common;

use common::*;
use gatekeeper::auth::RateLimitConfig;
use gatekeeper::error::ErrorBody;
use reqwest::StatusCode;

/// Test 1: Burst is admitted, the next request is rejected with 429
#[tokio::test]
async fn test_burst_then_too_many_requests() {
    let state = create_test_state(RateLimitConfig {
        requests_per_second: 1,
        burst: Some(3),
    });
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client
            .get(format!("http://{}/healthz", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = client
        .get(format!("http://{}/healthz", addr))
        .header("x-request-id", "flood-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.code, 429001);
    assert_eq!(body.message, "Too Many Requests");
    assert_eq!(body.request_id, "flood-1");
}

/// Test 2: Rejected requests never reach authentication
#[tokio::test]
async fn test_rejection_precedes_authentication() {
    let state = create_test_state(RateLimitConfig {
        requests_per_second: 1,
        burst: Some(1),
    });
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let first = client
        .get(format!("http://{}/api/v1/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = client
        .get(format!("http://{}/api/v1/me", addr))
        .header("Authorization", "Bearer garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

/// Test 3: A permit comes back after one refill interval
#[tokio::test]
async fn test_refill_after_interval() {
    let state = create_test_state(RateLimitConfig {
        requests_per_second: 5,
        burst: Some(1),
    });
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/healthz", addr);

    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // One interval at 5 rps is 200ms
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::OK
    );
}

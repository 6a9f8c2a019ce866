//! Additional integration tests for specific request flows.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use escrow_auth_service::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use escrow_auth_service::app::AppState;
use escrow_auth_service::test_utils::{MockDatabaseClient, MockSmsGateway};

const PHONE: &str = "+447700900123";

fn create_test_state() -> (Arc<AppState>, Arc<MockDatabaseClient>, Arc<MockSmsGateway>) {
    let db = Arc::new(MockDatabaseClient::new());
    let sms = Arc::new(MockSmsGateway::new());
    let state = Arc::new(AppState::new(
        Arc::clone(&db) as _,
        Arc::clone(&db) as _,
        Arc::clone(&sms) as _,
    ));
    (state, db, sms)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn request_code(router: &Router, sms: &MockSmsGateway) -> String {
    // Trunk prefix is stripped during normalization
    let body = json!({ "countryCode": "44", "mobileNumber": "07700900123" });
    let response = router
        .clone()
        .oneshot(post_json("/otp/request", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["value"]["phoneNumber"], PHONE);
    sms.last_code_for(PHONE).expect("no SMS recorded")
}

#[tokio::test]
async fn test_full_login_flow_with_generated_code() {
    let (state, db, sms) = create_test_state();
    let router = create_router(state);

    let code = request_code(&router, &sms).await;
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    // Plaintext code never reaches the store
    let challenge = db.get_challenge(PHONE).unwrap();
    assert_ne!(challenge.code_hash, code);

    let body = json!({ "countryCode": "+44", "mobileNumber": "7700900123", "otp": code });
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/otp/verify")
                .header("Content-Type", "application/json")
                .header("X-Request-Id", "login-1")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["isSuccess"], true);
    assert_eq!(json["value"]["phoneNumber"], PHONE);
    assert_eq!(json["value"]["audit"]["createdBy"], "request:login-1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verification_succeeds_once() {
    let (state, db, sms) = create_test_state();
    let router = create_router(state);
    let code = request_code(&router, &sms).await;

    let body = json!({ "countryCode": "+44", "mobileNumber": "7700900123", "otp": code });
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            let request = post_json("/otp/verify", &body);
            tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            successes += 1;
        } else {
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(db.user_count(), 1);
}

#[tokio::test]
async fn test_global_rate_limit_returns_envelope() {
    let (state, _db, _sms) = create_test_state();
    let router = create_router_with_rate_limit(
        state,
        RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        },
    );

    let body = json!({ "countryCode": "+1", "mobileNumber": "5550100", "otp": "123456" });
    let first = router
        .clone()
        .oneshot(post_json("/otp/verify", &body))
        .await
        .unwrap();
    assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = router
        .clone()
        .oneshot(post_json("/otp/verify", &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));

    let json = body_json(second).await;
    assert_eq!(json["isSuccess"], false);
    assert_eq!(json["errorCode"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_global_rate_limit_skips_health() {
    let (state, _db, _sms) = create_test_state();
    let router = create_router_with_rate_limit(
        state,
        RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        },
    );

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_storage_outage_on_verify() {
    let db = Arc::new(MockDatabaseClient::failing("connection refused"));
    let sms = Arc::new(MockSmsGateway::new());
    let router = create_router(Arc::new(AppState::new(
        Arc::clone(&db) as _,
        db as _,
        sms as _,
    )));

    let body = json!({ "countryCode": "+1", "mobileNumber": "5550100", "otp": "123456" });
    let response = router.oneshot(post_json("/otp/verify", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["errorCode"], "STORAGE_UNAVAILABLE");
    assert!(!json["errorMessage"].as_str().unwrap().contains("refused"));
}

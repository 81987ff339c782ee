//! Health endpoints.

use axum::http::StatusCode;

use gongora_integration_tests::TestApp;

#[tokio::test]
async fn test_liveness() {
    let mut app = TestApp::new();

    let response = app.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_readiness_without_database() {
    let mut app = TestApp::new();

    let response = app.get("/health/ready").await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

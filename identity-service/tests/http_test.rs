//! Router-level smoke tests over the mock-backed app.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::harness;
use identity_service::build_router;
use tower::util::ServiceExt;

fn json_post(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn register_returns_the_uniform_envelope() {
    let h = harness();
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(json_post(
            "/auth/register",
            r#"{"email": "worker@example.com", "password": "Ab1!aaaa1", "confirm_password": "Ab1!aaaa1"}"#
                .to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["success"], true);
    assert!(envelope["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("check your email"));
}

#[tokio::test]
async fn invalid_login_yields_a_failure_envelope() {
    let h = harness();
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(json_post(
            "/auth/login",
            r#"{"email": "nobody@example.com", "password": "whatever1"}"#.to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["status"], 404);
}

#[tokio::test]
async fn expired_confirmation_link_is_a_bad_request() {
    let h = harness();
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/verify?token=deadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn successful_login_sets_session_cookies() {
    let h = harness();
    common::seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(json_post(
            "/auth/login",
            r#"{"email": "worker@example.com", "password": "Ab1!aaaa1"}"#.to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<String> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();

    let access = cookies
        .iter()
        .find(|c| c.starts_with("access_token="))
        .expect("access cookie");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Secure"));
    assert!(access.contains("SameSite=Strict"));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=")));
}

#[tokio::test]
async fn protected_routes_require_an_access_token() {
    let h = harness();
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_store_status() {
    let h = harness();
    let app = build_router(h.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

//! Router-level tests for the webhook management API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use phase_core::{MemoryStore, RealClock, Registry};
use phase_api::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router() -> Router {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new(store.clone(), Arc::new(RealClock::new())));
    create_router(AppState::new(store, registry))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_webhook(payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/webhooks")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let app = test_router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn register_returns_201_with_secret() {
    let app = test_router();

    let payload = json!({
        "url": "https://example.com/hooks/stake",
        "events": ["stake_confirmed", "reward_earned"],
    });
    let response = app.oneshot(post_webhook(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["webhook"]["id"].is_string());
    assert!(body["webhook"]["secret"].as_str().unwrap().starts_with("whsec_"));
    assert_eq!(body["webhook"]["active"], true);
    assert_eq!(body["webhook"]["events"], json!(["stake_confirmed", "reward_earned"]));
    assert!(body["webhook"]["createdAt"].is_string());
    assert!(body["webhook"].get("created_at").is_none());
}

#[tokio::test]
async fn register_rejects_invalid_url() {
    let app = test_router();

    let payload = json!({ "url": "not a url", "events": ["stake_confirmed"] });
    let response = app.oneshot(post_webhook(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn register_rejects_unknown_event() {
    let app = test_router();

    let payload = json!({
        "url": "https://example.com/hooks",
        "events": ["stake_confirmed", "stake_vaporized"],
    });
    let response = app.oneshot(post_webhook(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("stake_vaporized"));
}

#[tokio::test]
async fn register_rejects_empty_events() {
    let app = test_router();

    let payload = json!({ "url": "https://example.com/hooks", "events": [] });
    let response = app.oneshot(post_webhook(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn register_rejects_malformed_body() {
    let app = test_router();

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn list_omits_secret() {
    let app = test_router();

    let payload = json!({ "url": "https://example.com/hooks", "events": ["stake_confirmed"] });
    app.clone().oneshot(post_webhook(&payload)).await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/api/webhooks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let webhooks = body["webhooks"].as_array().unwrap();
    assert_eq!(webhooks.len(), 1);
    assert!(webhooks[0].get("secret").is_none());
    assert_eq!(webhooks[0]["failureCount"], 0);
    assert!(webhooks[0]["createdAt"].is_string());
    assert!(webhooks[0]["lastDeliveryAt"].is_null());
}

#[tokio::test]
async fn delete_existing_webhook_returns_200() {
    let app = test_router();

    let payload = json!({ "url": "https://example.com/hooks", "events": ["stake_confirmed"] });
    let created = app.clone().oneshot(post_webhook(&payload)).await.unwrap();
    let created_body = body_json(created).await;
    let id = created_body["webhook"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/webhooks/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    // The registration is gone from subsequent lists.
    let list = app
        .oneshot(Request::builder().uri("/api/webhooks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let list_body = body_json(list).await;
    assert!(list_body["webhooks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_unknown_webhook_returns_404() {
    let app = test_router();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/webhooks/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "WEBHOOK_NOT_FOUND");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = test_router();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("X-Request-Id"));
}

//! In-process tests against the gateway router, no sockets involved.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use edge_gateway::audit::MemoryAuditStore;
use edge_gateway::config::GatewayConfig;
use edge_gateway::GatewayServer;
use std::sync::Arc;

mod common;

fn server() -> GatewayServer {
    let mut config = GatewayConfig::default();
    config.origin.url = "http://127.0.0.1:9".to_string();
    GatewayServer::new(config, common::memory_store(), Arc::new(MemoryAuditStore::new(100))).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_blocked_country_on_sensitive_route() {
    let response = server()
        .router()
        .oneshot(
            Request::post("/api/billing/invoices")
                .header("cf-connecting-ip", "203.0.113.9")
                .header("cf-ipcountry", "kp")
                .header("cf-bot-score", "90")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["referrer-policy"], "strict-origin-when-cross-origin");
    let body = body_json(response).await;
    assert_eq!(body["error"], "blocked");
    assert!(body["reason"].as_str().unwrap().contains("KP"));
}

#[tokio::test]
async fn test_low_bot_score_blocked() {
    let response = server()
        .router()
        .oneshot(
            Request::get("/api/items")
                .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
                .header("cf-bot-score", "5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(body["reason"].as_str().unwrap().contains("bot score 5"));
}

#[tokio::test]
async fn test_mid_bot_score_challenged() {
    let response = server()
        .router()
        .oneshot(
            Request::get("/pricing")
                .header("cf-bot-score", "20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "30");
    let body = body_json(response).await;
    assert_eq!(body["error"], "challenge_required");
    assert_eq!(body["challenge_url"], "/challenge?return_to=%2Fpricing");
}

#[tokio::test]
async fn test_script_in_body_blocked() {
    let response = server()
        .router()
        .oneshot(
            Request::post("/api/comments")
                .header("cf-bot-score", "90")
                .body(Body::from("<script>document.location='//evil'</script>"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_incoming_request_id_is_echoed() {
    let response = server()
        .router()
        .oneshot(
            Request::get("/etc/../../etc/passwd")
                .header("x-request-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()["x-request-id"], "trace-abc");
}

//! End-to-end tests: real sockets, mock origin, gateway in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use edge_gateway::audit::{AuditSink, EventType};
use edge_gateway::config::RateLimitRule;

mod common;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_login_rate_limit_scenario() {
    let origin = addr(28481);
    let gateway = addr(28482);
    common::start_mock_origin(origin, "welcome").await;
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;

    let client = common::client();
    let login = || {
        client
            .post(format!("http://{gateway}/api/auth/login"))
            .header("cf-connecting-ip", "1.2.3.4")
            .header("cf-ipcountry", "US")
            .header("cf-bot-score", "90")
            .body("user=alice&password=hunter2")
    };

    for n in 1..=5 {
        let res = login().send().await.expect("gateway unreachable");
        assert_eq!(res.status(), 200, "call {n} should be forwarded");
        assert_eq!(res.headers()["x-frame-options"], "DENY");
        assert!(res.headers().contains_key("strict-transport-security"));
        assert!(res.headers().contains_key("x-request-id"));
        assert_eq!(res.text().await.unwrap(), "welcome");
    }

    let res = login().send().await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["retry-after"], "600");
    assert!(res.headers().contains_key("content-security-policy"));

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert!(body["reason"].as_str().unwrap().contains("6/5"));
    assert_eq!(body["retry_after"], 600);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let summary = running.audit.summarize(0, u64::MAX).await.unwrap();
    assert_eq!(summary.rate_limits, 1);

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_attack_blocked_regardless_of_other_signals() {
    let origin = addr(28483);
    let gateway = addr(28484);
    common::start_mock_origin(origin, "should not be reached").await;
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;

    let res = common::client()
        .get(format!("http://{gateway}/search?q=1%27%20UNION%20SELECT%20password%20FROM%20users"))
        .header("cf-connecting-ip", "5.6.7.8")
        .header("cf-ipcountry", "US")
        .header("cf-bot-score", "99")
        .header("cf-verified-bot", "true")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
    assert!(res.headers().contains_key("x-content-type-options"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "blocked");
    assert!(body["timestamp"].as_u64().is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = running.audit.recent(10).await.unwrap();
    let attack = events
        .iter()
        .find(|e| e.event_type == EventType::AttackBlocked)
        .expect("attack event recorded");
    assert_eq!(attack.subject, "5.6.7.8");
    assert_eq!(attack.fields["signature"], "sqli_union_select");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_unlisted_country_challenged_on_sensitive_route() {
    let origin = addr(28485);
    let gateway = addr(28486);
    common::start_mock_origin(origin, "ok").await;
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;
    let client = common::client();

    let res = client
        .post(format!("http://{gateway}/api/auth/login"))
        .header("cf-connecting-ip", "7.7.7.7")
        .header("cf-ipcountry", "BR")
        .header("cf-bot-score", "90")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["retry-after"], "30");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "challenge_required");
    assert_eq!(body["challenge_url"], "/challenge?return_to=%2Fapi%2Fauth%2Flogin");

    // Same country on a non-sensitive route is not affected by geo policy.
    let res = client
        .get(format!("http://{gateway}/api/items"))
        .header("cf-connecting-ip", "7.7.7.7")
        .header("cf-ipcountry", "BR")
        .header("cf-bot-score", "90")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_body_replayed_to_origin() {
    let origin = addr(28487);
    let gateway = addr(28488);
    common::start_echo_origin(origin).await;
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;

    let payload = "{\"title\":\"quarterly report\",\"body\":\"numbers went up\"}";
    let res = common::client()
        .post(format!("http://{gateway}/api/posts"))
        .header("cf-bot-score", "90")
        .header("content-type", "application/json")
        .body(payload)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), payload);

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let origin = addr(28489);
    let gateway = addr(28490);
    common::start_echo_origin(origin).await;
    let mut config = common::config_for(origin);
    config.security.max_body_size = 1024;
    let running = common::start_gateway(gateway, config, common::memory_store()).await;

    let res = common::client()
        .post(format!("http://{gateway}/api/upload"))
        .header("cf-bot-score", "90")
        .body(vec![b'a'; 4096])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
    assert!(res.headers().contains_key("x-frame-options"));

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_origin_down_returns_bad_gateway_without_retry() {
    // Nothing listens on the origin port.
    let origin = addr(28491);
    let gateway = addr(28492);
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;

    let res = common::client()
        .get(format!("http://{gateway}/"))
        .header("cf-bot-score", "90")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "origin_unavailable");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_counter_store_outage_fails_open() {
    let origin = addr(28493);
    let gateway = addr(28494);
    common::start_mock_origin(origin, "still serving").await;
    let mut config = common::config_for(origin);
    config.audit.store_error_sample_rate = 1.0;
    let running = common::start_gateway(gateway, config, Arc::new(common::UnreachableStore)).await;

    let client = common::client();
    for _ in 0..8 {
        let res = client
            .post(format!("http://{gateway}/api/auth/login"))
            .header("cf-ipcountry", "US")
            .header("cf-bot-score", "90")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let summary = running.audit.summarize(0, u64::MAX).await.unwrap();
    assert_eq!(summary.store_errors, 8);
    assert_eq!(summary.rate_limits, 0);

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_policy_hot_swap() {
    let origin = addr(28495);
    let gateway = addr(28496);
    common::start_mock_origin(origin, "ok").await;
    let config = common::config_for(origin);
    let running = common::start_gateway(gateway, config.clone(), common::memory_store()).await;

    let mut tightened = config;
    tightened.policy.rate_limits.insert(
        "default".to_string(),
        RateLimitRule { requests: 1, window_seconds: 60, block_seconds: 15 },
    );
    running.config_updates.send(tightened).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = common::client();
    let get = || {
        client
            .get(format!("http://{gateway}/about"))
            .header("cf-connecting-ip", "8.8.4.4")
            .header("cf-bot-score", "90")
            .send()
    };

    assert_eq!(get().await.unwrap().status(), 200);
    let res = get().await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["retry-after"], "15");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_panicking_stage_becomes_internal_error() {
    let origin = addr(28497);
    let gateway = addr(28498);
    common::start_mock_origin(origin, "should not be reached").await;
    let running = common::start_gateway(gateway, common::config_for(origin), Arc::new(common::PanickingStore)).await;

    let res = common::client()
        .get(format!("http://{gateway}/about"))
        .header("cf-connecting-ip", "9.9.9.9")
        .header("cf-bot-score", "90")
        .send()
        .await
        .expect("connection should survive a panicking stage");

    assert_eq!(res.status(), 500);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert!(res.headers().contains_key("x-request-id"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "internal_error");
    // Panic detail stays in the logs.
    assert!(!body["reason"].as_str().unwrap().contains("connection pool"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = running.audit.recent(10).await.unwrap();
    let internal: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::InternalError)
        .collect();
    assert_eq!(internal.len(), 1);
    assert_eq!(internal[0].subject, "9.9.9.9");
    assert_eq!(internal[0].route, "/about");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_silent_origin_times_out_with_json() {
    let origin = addr(28499);
    let gateway = addr(28500);
    common::start_silent_origin(origin).await;
    let mut config = common::config_for(origin);
    config.timeouts.request_secs = 1;
    let running = common::start_gateway(gateway, config, common::memory_store()).await;

    let res = common::client()
        .get(format!("http://{gateway}/about"))
        .header("cf-bot-score", "90")
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 504);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert!(res.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "origin_timeout");

    running.shutdown.trigger();
}

#[tokio::test]
async fn test_events_from_draining_connections_are_written() {
    let origin = addr(28501);
    let gateway = addr(28502);
    common::start_mock_origin(origin, "should not be reached").await;
    let running = common::start_gateway(gateway, common::config_for(origin), common::memory_store()).await;

    let body = "comment=<script>alert(1)</script>";
    let head = format!(
        "POST /api/comments HTTP/1.1\r\nHost: {gateway}\r\ncf-bot-score: 90\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut socket = TcpStream::connect(gateway).await.unwrap();
    socket.write_all(head.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Shutdown begins while the request body is still in flight.
    running.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(100)).await;
    socket.write_all(body.as_bytes()).await.unwrap();

    let mut response = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut response))
        .await
        .expect("draining connection should still be answered")
        .unwrap();
    assert!(String::from_utf8_lossy(&response[..n]).starts_with("HTTP/1.1 403"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let summary = running.audit.summarize(0, u64::MAX).await.unwrap();
    assert_eq!(summary.attacks, 1);
}

//! Shared utilities for gateway integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use edge_gateway::audit::MemoryAuditStore;
use edge_gateway::config::GatewayConfig;
use edge_gateway::store::{
    CounterStore, CounterStoreError, MemoryCounterStore, RateLimitKey, SystemClock,
};
use edge_gateway::{GatewayServer, Shutdown};

/// Read one HTTP/1.1 request and return its body.
async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return Vec::new(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    buf[head_end..].to_vec()
}

async fn respond(socket: &mut TcpStream, status: &str, extra_headers: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        body.len(),
        extra_headers
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(body).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Origin that always answers 200 with a fixed body.
pub async fn start_mock_origin(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request(&mut socket).await;
                // Conflicting value; the gateway's policy header must win.
                respond(&mut socket, "200 OK", "X-Frame-Options: ALLOWALL\r\n", response.as_bytes()).await;
            });
        }
    });
}

/// Origin that echoes the request body back.
pub async fn start_echo_origin(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let body = read_request(&mut socket).await;
                respond(&mut socket, "200 OK", "", &body).await;
            });
        }
    });
}

/// Origin that accepts connections and reads the request but never answers.
pub async fn start_silent_origin(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request(&mut socket).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });
}

/// Counter store whose backend panics on every call.
#[derive(Debug)]
pub struct PanickingStore;

#[async_trait]
impl CounterStore for PanickingStore {
    async fn increment_and_count(
        &self,
        _key: &RateLimitKey,
        _window_seconds: u64,
    ) -> Result<u64, CounterStoreError> {
        panic!("counter backend corrupted its connection pool")
    }

    fn backend_name(&self) -> &'static str {
        "panicking"
    }
}

/// Counter store whose backend is always unreachable.
#[derive(Debug)]
pub struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment_and_count(
        &self,
        _key: &RateLimitKey,
        _window_seconds: u64,
    ) -> Result<u64, CounterStoreError> {
        Err(CounterStoreError::Unavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

pub fn memory_store() -> Arc<dyn CounterStore> {
    Arc::new(MemoryCounterStore::new(Arc::new(SystemClock), 60))
}

pub fn config_for(origin: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.origin.url = format!("http://{origin}");
    config.observability.metrics_enabled = false;
    config
}

pub struct RunningGateway {
    pub shutdown: Shutdown,
    pub audit: Arc<MemoryAuditStore>,
    pub config_updates: mpsc::UnboundedSender<GatewayConfig>,
}

/// Start a gateway on `addr` and wait until it accepts connections.
pub async fn start_gateway(
    addr: SocketAddr,
    config: GatewayConfig,
    store: Arc<dyn CounterStore>,
) -> RunningGateway {
    let audit = Arc::new(MemoryAuditStore::new(1_000));
    let server = GatewayServer::new(config, store, audit.clone()).unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind(addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    RunningGateway {
        shutdown,
        audit,
        config_updates,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

//! HTTP server setup and the gateway handler.
//!
//! # Responsibilities
//! - Build the axum router and its tower middleware stack
//! - Evaluate every request against the current policy snapshot
//! - Forward allowed requests to the origin (single attempt, no retries)
//! - Turn panics and timeouts into JSON errors that still carry the policy's
//!   security headers
//! - Apply policy reloads and run the audit worker for the server's lifetime

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{request::Parts, HeaderValue, Request, Uri};
use axum::middleware::map_response_with_state;
use axum::response::Response;
use axum::Router;
use futures_util::FutureExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::admin::AdminState;
use crate::audit::{AuditEmitter, AuditSink, AuditWorker, EventType, Sampling, SecurityEvent};
use crate::config::{GatewayConfig, SignalHeadersConfig};
use crate::decision::{Action, DecisionEngine, RequestContext};
use crate::error::{GatewayError, StartupError};
use crate::http::{request, response};
use crate::observability::metrics;
use crate::observability::tracing::GatewaySpan;
use crate::policy::{PolicyConfig, PolicyHandle};
use crate::security::RateLimiter;
use crate::store::CounterStore;

const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Where allowed traffic is sent.
#[derive(Debug, Clone)]
pub struct OriginTarget {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl OriginTarget {
    pub fn parse(url: &str) -> Result<Self, StartupError> {
        let invalid = || StartupError::Address {
            field: "origin.url",
            value: url.to_string(),
        };
        let uri: Uri = url.parse().map_err(|_| invalid())?;
        let parts = uri.into_parts();
        Ok(Self {
            scheme: parts.scheme.ok_or_else(invalid)?,
            authority: parts.authority.ok_or_else(invalid)?,
            base_path: parts
                .path_and_query
                .map(|pq| pq.path().trim_end_matches('/').to_string())
                .unwrap_or_default(),
        })
    }

    /// Rewrite an inbound URI onto the origin, keeping path and query.
    pub fn rewrite(&self, uri: &Uri) -> Result<Uri, GatewayError> {
        let target = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("/");

        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if !self.base_path.is_empty() {
            let joined = format!("{}{}", self.base_path, target);
            parts.path_and_query = joined.parse::<PathAndQuery>().ok();
        }
        Ok(Uri::from_parts(parts)?)
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<PolicyHandle>,
    pub engine: DecisionEngine,
    pub client: Client<HttpConnector, Body>,
    pub origin: Arc<OriginTarget>,
    pub signals: Arc<SignalHeadersConfig>,
    pub max_body_size: usize,
    /// Bound on receiving the request body and, separately, on the origin's
    /// response head.
    pub request_timeout: Duration,
}

/// The gateway's public listener.
pub struct GatewayServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
    store: Arc<dyn CounterStore>,
    sink: Arc<dyn AuditSink>,
    audit_rx: mpsc::Receiver<SecurityEvent>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn CounterStore>,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, StartupError> {
        let policy = Arc::new(PolicyHandle::new(PolicyConfig::compile(&config)?));
        let origin = Arc::new(OriginTarget::parse(&config.origin.url)?);

        let (audit, audit_rx) = AuditEmitter::channel(
            config.audit.channel_capacity,
            Sampling {
                allow_rate: config.audit.allow_sample_rate,
                store_error_rate: config.audit.store_error_sample_rate,
            },
        );
        let engine = DecisionEngine::new(RateLimiter::new(store.clone()), audit);

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            policy,
            engine,
            client,
            origin,
            signals: Arc::new(config.signals.clone()),
            max_body_size: config.security.max_body_size,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
            store,
            sink,
            audit_rx,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Security headers sit outside the panic guard so that every response,
    /// including a synthesized 500, carries them.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let policy = state.policy.clone();
        let panic_response = PanicResponse {
            audit: state.engine.audit().clone(),
        };

        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(map_response_with_state(policy, apply_security_headers))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_in_flight))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(GatewaySpan))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The request router, for in-process use without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn policy(&self) -> Arc<PolicyHandle> {
        self.state.policy.clone()
    }

    pub fn audit(&self) -> &AuditEmitter {
        self.state.engine.audit()
    }

    /// State for the admin API, sharing this server's policy and sink.
    pub fn admin_state(&self) -> AdminState {
        AdminState::new(
            self.state.policy.clone(),
            self.sink.clone(),
            self.state.engine.audit().clone(),
            &self.config.admin.api_key,
        )
    }

    /// Run until `shutdown` fires. Policy snapshots received on
    /// `config_updates` are compiled and swapped in; an invalid one is
    /// rejected and the current snapshot kept.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.config.origin.url,
            counter_store = self.store.backend_name(),
            audit_sink = self.sink.backend_name(),
            "Gateway starting"
        );

        // The worker outlives the listener so events from draining
        // connections still reach the sink.
        let (worker_stop, worker_stop_rx) = broadcast::channel(1);
        let worker = AuditWorker::new(self.audit_rx, self.sink.clone());
        let worker_handle = tokio::spawn(worker.run(worker_stop_rx));

        tokio::spawn(apply_policy_updates(
            self.state.policy.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));
        tokio::spawn(purge_counters(self.store.clone(), shutdown.resubscribe()));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        let _ = worker_stop.send(());
        if let Err(e) = worker_handle.await {
            tracing::warn!(error = %e, "Audit worker ended abnormally");
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn apply_policy_updates(
    policy: Arc<PolicyHandle>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match PolicyConfig::compile(&config) {
                    Ok(compiled) => {
                        let generation = policy.swap(compiled);
                        metrics::record_policy_reload("applied");
                        tracing::info!(
                            generation,
                            "Policy snapshot swapped; non-policy sections apply on restart"
                        );
                    }
                    Err(e) => {
                        metrics::record_policy_reload("rejected");
                        tracing::error!(error = %e, "Policy reload rejected, keeping current snapshot");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn purge_counters(store: Arc<dyn CounterStore>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Expired counter records removed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Main gateway handler: inspect, decide, then forward or deny.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let (parts, body) = request.into_parts();

    // One snapshot for the whole request.
    let policy = state.policy.load();
    let ctx = request::extract_context(&parts, peer, &state.signals);

    let outcome = AssertUnwindSafe(process(&state, &policy, &ctx, parts, body))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(GatewayError::Panic(panic_message(&*panic))));

    let (response, action) = match outcome {
        Ok(done) => done,
        Err(e) => (fail(&state, &ctx, e), "error"),
    };
    metrics::record_request(&ctx.method, response.status().as_u16(), action, start);
    response
}

async fn process(
    state: &AppState,
    policy: &PolicyConfig,
    ctx: &RequestContext,
    parts: Parts,
    body: Body,
) -> Result<(Response, &'static str), GatewayError> {
    let read = request::read_body(body, &parts.headers, state.max_body_size);
    let body = tokio::time::timeout(state.request_timeout, read)
        .await
        .map_err(|_| GatewayError::BodyTimeout(state.request_timeout))??;

    let decision = state.engine.evaluate(policy, ctx, &body).await;
    if decision.action != Action::Allow {
        let response = response::denial(&decision, policy, &ctx.path);
        return Ok((response, decision.action.as_str()));
    }

    let response = tokio::time::timeout(
        state.request_timeout,
        forward(state, parts, ctx.address, body),
    )
    .await
    .map_err(|_| {
        metrics::record_origin_error("timeout");
        GatewayError::OriginTimeout(state.request_timeout)
    })??;
    Ok((response, Action::Allow.as_str()))
}

async fn apply_security_headers(
    State(policy): State<Arc<PolicyHandle>>,
    mut response: Response,
) -> Response {
    policy.load().headers.apply(response.headers_mut());
    response
}

/// Last resort for panics outside the request pipeline (signal extraction,
/// middleware). The request context is gone by then.
#[derive(Clone)]
struct PanicResponse {
    audit: AuditEmitter,
}

impl ResponseForPanic for PanicResponse {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, panic: Box<dyn Any + Send + 'static>) -> Response {
        let err = GatewayError::Panic(panic_message(&*panic));
        tracing::error!(error = %err, "Panic outside request pipeline");
        self.audit.emit(
            SecurityEvent::new(EventType::InternalError, "unknown", "unknown")
                .with_field("error", err.to_string()),
        );
        response::error(&err)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn forward(
    state: &AppState,
    parts: Parts,
    client: IpAddr,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let uri = state.origin.rewrite(&parts.uri)?;

    let mut headers = parts.headers;
    response::strip_hop_by_hop(&mut headers);
    headers.remove(axum::http::header::HOST);
    let forwarded_for = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(chain) => format!("{chain}, {client}"),
        None => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", value);
    }

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(Body::from(body))?;
    *outbound.headers_mut() = headers;

    let upstream = state.client.request(outbound).await.map_err(|e| {
        metrics::record_origin_error("connect");
        e
    })?;

    let (mut parts, body) = upstream.into_parts();
    response::strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(body)))
}

fn fail(state: &AppState, ctx: &RequestContext, err: GatewayError) -> Response {
    if err.is_internal() {
        tracing::error!(request_id = %ctx.request_id, error = %err, "Internal gateway error");
        state.engine.audit().emit(
            SecurityEvent::new(EventType::InternalError, ctx.address.to_string(), &ctx.path)
                .with_field("request_id", ctx.request_id.as_str())
                .with_field("error", err.to_string()),
        );
    } else {
        tracing::warn!(request_id = %ctx.request_id, error = %err, "Request failed");
    }
    response::error(&err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_rewrite() {
        let origin = OriginTarget::parse("http://127.0.0.1:3000").unwrap();
        let uri: Uri = "/api/items?page=2".parse().unwrap();
        assert_eq!(
            origin.rewrite(&uri).unwrap().to_string(),
            "http://127.0.0.1:3000/api/items?page=2"
        );

        let origin = OriginTarget::parse("http://origin.internal/app/").unwrap();
        assert_eq!(
            origin.rewrite(&uri).unwrap().to_string(),
            "http://origin.internal/app/api/items?page=2"
        );
    }

    #[test]
    fn test_origin_requires_authority() {
        assert!(OriginTarget::parse("/relative").is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("store exploded");
        assert_eq!(panic_message(&*payload), "store exploded");

        let payload: Box<dyn Any + Send> = Box::new(format!("slot {}", 3));
        assert_eq!(panic_message(&*payload), "slot 3");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::audit::{AnalyticsSummary, SecurityEvent};
use crate::config::RateLimitRule;
use crate::store::clock::unix_now;

const DEFAULT_ANALYTICS_RANGE_SECS: u64 = 24 * 60 * 60;
const DEFAULT_EVENT_LIMIT: usize = 50;
const MAX_EVENT_LIMIT: usize = 1_000;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub policy_generation: u64,
    pub policy_compiled_at: u64,
    pub audit_sink: &'static str,
    pub audit_queued: u64,
    pub audit_dropped: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let policy = state.policy.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: unix_now().saturating_sub(state.started_at),
        policy_generation: state.policy.generation(),
        policy_compiled_at: policy.compiled_at,
        audit_sink: state.sink.backend_name(),
        audit_queued: state.audit.queued(),
        audit_dropped: state.audit.dropped(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

/// Counts over `[from, to]`; defaults to the last 24 hours.
pub async fn get_analytics(
    State(state): State<AdminState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    let to = query.to.unwrap_or_else(unix_now);
    let from = query
        .from
        .unwrap_or_else(|| to.saturating_sub(DEFAULT_ANALYTICS_RANGE_SECS));
    if from > to {
        return Err(api_error(StatusCode::BAD_REQUEST, "`from` must not be after `to`"));
    }

    state
        .sink
        .summarize(from, to)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn get_events(
    State(state): State<AdminState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<SecurityEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    state
        .sink
        .recent(limit)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))
}

#[derive(Serialize)]
pub struct PolicySummary {
    pub generation: u64,
    pub compiled_at: u64,
    pub rate_limits: BTreeMap<String, RateLimitRule>,
    pub principal_rate_limits: BTreeMap<String, RateLimitRule>,
    pub signatures: usize,
    pub security_headers: usize,
    pub missing_bot_score: u8,
    pub challenge_url: String,
}

pub async fn get_policy(State(state): State<AdminState>) -> Json<PolicySummary> {
    let policy = state.policy.load();
    let owned = |table: BTreeMap<&str, RateLimitRule>| {
        table
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>()
    };

    Json(PolicySummary {
        generation: state.policy.generation(),
        compiled_at: policy.compiled_at,
        rate_limits: owned(policy.rate_limits()),
        principal_rate_limits: owned(policy.principal_rate_limits()),
        signatures: policy.signatures.len(),
        security_headers: policy.headers.len(),
        missing_bot_score: policy.missing_bot_score,
        challenge_url: policy.challenge_url.clone(),
    })
}

//! Response shaping.
//!
//! Denials and gateway errors become JSON bodies with the right status and
//! retry hints. Every response leaving the gateway gets the policy's
//! security headers.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::decision::{Action, Decision};
use crate::error::GatewayError;
use crate::policy::PolicyConfig;
use crate::store::clock::unix_now;

/// Headers that describe a single hop and must not be forwarded.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub reason: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl ErrorBody {
    fn new(error: &'static str, reason: impl Into<String>) -> Self {
        Self {
            error,
            reason: reason.into(),
            timestamp: unix_now(),
            challenge_url: None,
            retry_after: None,
            remaining: None,
            limit: None,
        }
    }
}

/// Synthesize the response for a non-allow decision.
pub fn denial(decision: &Decision, policy: &PolicyConfig, path: &str) -> Response {
    let (status, mut body) = match decision.action {
        Action::Block => (StatusCode::FORBIDDEN, ErrorBody::new("blocked", &decision.reason)),
        Action::Challenge => {
            let mut body = ErrorBody::new("challenge_required", &decision.reason);
            body.challenge_url = Some(challenge_target(&policy.challenge_url, path));
            (StatusCode::TOO_MANY_REQUESTS, body)
        }
        Action::RateLimited => {
            let mut body = ErrorBody::new("rate_limited", &decision.reason);
            if let Some(pass) = decision.limit_pass() {
                body.remaining = Some(pass.remaining());
                body.limit = Some(pass.limit);
            }
            (StatusCode::TOO_MANY_REQUESTS, body)
        }
        // Allowed requests are forwarded, never shaped here.
        Action::Allow => (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new("internal_error", "unexpected allow")),
    };
    body.retry_after = decision.retry_after_secs;

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = decision.retry_after_secs {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Response for a gateway error. Internal errors never leak their detail.
pub fn error(err: &GatewayError) -> Response {
    let reason = if err.is_internal() {
        "The gateway could not process this request".to_string()
    } else {
        err.to_string()
    };
    (err.status(), Json(ErrorBody::new(err.code(), reason))).into_response()
}

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn challenge_target(challenge_url: &str, path: &str) -> String {
    let return_to: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    let sep = if challenge_url.contains('?') { '&' } else { '?' };
    format!("{challenge_url}{sep}return_to={return_to}")
}

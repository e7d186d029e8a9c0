//! Request spans.
//!
//! Every request runs inside a `request` span carrying the id assigned by
//! the request-id layer, so decision and audit logs correlate.

use axum::http::Request;
use tower_http::trace::MakeSpan;

use crate::http::X_REQUEST_ID;

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewaySpan;

impl<B> MakeSpan<B> for GatewaySpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

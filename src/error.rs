//! Gateway-level error taxonomy.
//!
//! Policy outcomes (403/429) are not errors. Everything here is a gateway
//! malfunction or a malformed exchange, mapped to a status code at the
//! handler boundary.

use std::time::Duration;

use axum::http::StatusCode;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::policy::PolicyError;
use crate::store::CounterStoreError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    UnreadableBody(String),

    #[error("request body not received within {0:?}")]
    BodyTimeout(Duration),

    #[error("origin did not respond within {0:?}")]
    OriginTimeout(Duration),

    #[error("origin request failed: {0}")]
    Origin(#[from] hyper_util::client::legacy::Error),

    #[error("invalid origin uri: {0}")]
    OriginUri(#[from] axum::http::uri::InvalidUriParts),

    #[error("failed to build forwarded request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("request pipeline panicked: {0}")]
    Panic(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            GatewayError::Origin(_) => StatusCode::BAD_GATEWAY,
            GatewayError::OriginTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::OriginUri(_) | GatewayError::Request(_) | GatewayError::Panic(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code used in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::UnreadableBody(_) => "bad_request",
            GatewayError::BodyTimeout(_) => "request_timeout",
            GatewayError::Origin(_) => "origin_unavailable",
            GatewayError::OriginTimeout(_) => "origin_timeout",
            GatewayError::OriginUri(_) | GatewayError::Request(_) | GatewayError::Panic(_) => {
                "internal_error"
            }
        }
    }

    /// Whether this is a gateway malfunction rather than a client or
    /// upstream problem.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Fatal errors while bringing the gateway up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("counter store unavailable: {0}")]
    CounterStore(#[from] CounterStoreError),

    #[error("audit sink unavailable: {0}")]
    Audit(#[from] AuditError),

    #[error("invalid address {field}: {value}")]
    Address { field: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::UnreadableBody("reset".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert!(!GatewayError::UnreadableBody("reset".into()).is_internal());

        let slow = GatewayError::OriginTimeout(std::time::Duration::from_secs(1));
        assert_eq!(slow.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(slow.code(), "origin_timeout");
        assert!(!slow.is_internal());

        let panicked = GatewayError::Panic("boom".into());
        assert_eq!(panicked.code(), "internal_error");
        assert!(panicked.is_internal());
    }
}

//! Admin API.
//!
//! Served on its own listener and guarded by a bearer key. Read-only: it
//! reports status, analytics over the audit sink, recent events and a
//! summary of the active policy snapshot.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::audit::{AuditEmitter, AuditSink};
use crate::policy::PolicyHandle;
use crate::store::clock::unix_now;

use self::auth::admin_auth_middleware;
use self::handlers::{get_analytics, get_events, get_policy, get_status};

#[derive(Clone)]
pub struct AdminState {
    pub policy: Arc<PolicyHandle>,
    pub sink: Arc<dyn AuditSink>,
    pub audit: AuditEmitter,
    api_key: Arc<str>,
    pub started_at: u64,
}

impl AdminState {
    pub fn new(
        policy: Arc<PolicyHandle>,
        sink: Arc<dyn AuditSink>,
        audit: AuditEmitter,
        api_key: &str,
    ) -> Self {
        Self {
            policy,
            sink,
            audit,
            api_key: Arc::from(api_key),
            started_at: unix_now(),
        }
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/analytics", get(get_analytics))
        .route("/admin/events", get(get_events))
        .route("/admin/policy", get(get_policy))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

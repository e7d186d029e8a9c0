//! Sliding-window rate limiting over the counter store.
//!
//! Every request gets a pass keyed by network address. Requests carrying an
//! authenticated principal get a second, independent pass keyed by principal
//! (typically a larger window and higher ceiling). Either pass exceeding its
//! ceiling rate-limits the request.
//!
//! Store failures fail open: the pass is skipped and the error is handed back
//! to the caller for auditing.

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::RateLimitRule;
use crate::observability::metrics;
use crate::policy::PolicyConfig;
use crate::store::{CounterStore, CounterStoreError, RateLimitKey, Subject};

/// Result of one limiter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitPass {
    pub subject_kind: &'static str,
    pub count: u64,
    pub limit: u64,
    pub window_seconds: u64,
    pub retry_after_secs: u64,
}

impl LimitPass {
    fn new(subject: &Subject, count: u64, rule: &RateLimitRule) -> Self {
        Self {
            subject_kind: subject.kind(),
            count,
            limit: rule.requests,
            window_seconds: rule.window_seconds,
            retry_after_secs: rule.block_seconds,
        }
    }

    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn reason(&self) -> String {
        format!(
            "Rate limit exceeded: {}/{} requests in {}s",
            self.count, self.limit, self.window_seconds
        )
    }
}

/// Outcome of all passes for one request.
#[derive(Debug, Default)]
pub struct RateLimitCheck {
    pub passes: Vec<LimitPass>,
    /// Store failures; the affected passes were treated as not exceeded.
    pub errors: Vec<CounterStoreError>,
}

impl RateLimitCheck {
    /// First pass over its ceiling, network pass first.
    pub fn exceeded(&self) -> Option<&LimitPass> {
        self.passes.iter().find(|pass| pass.exceeded())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub async fn check(
        &self,
        policy: &PolicyConfig,
        route_class: &str,
        address: IpAddr,
        principal: Option<&str>,
    ) -> RateLimitCheck {
        let network = self.pass(
            route_class,
            Subject::Address(address),
            Some(policy.rate_rule(route_class)),
        );
        let principal_rule = principal.and_then(|_| policy.principal_rate_rule(route_class));
        let by_principal = self.pass(
            route_class,
            Subject::Principal(principal.unwrap_or_default().to_string()),
            principal_rule,
        );

        let (network, by_principal) = tokio::join!(network, by_principal);

        let mut check = RateLimitCheck::default();
        for result in [network, by_principal].into_iter().flatten() {
            match result {
                Ok(pass) => check.passes.push(pass),
                Err(e) => check.errors.push(e),
            }
        }
        check
    }

    async fn pass(
        &self,
        route_class: &str,
        subject: Subject,
        rule: Option<&RateLimitRule>,
    ) -> Option<Result<LimitPass, CounterStoreError>> {
        let rule = rule?;
        let key = RateLimitKey::new(route_class, subject);

        let result = match self.store.increment_and_count(&key, rule.window_seconds).await {
            Ok(count) => Ok(LimitPass::new(&key.subject, count, rule)),
            Err(e) => {
                metrics::record_store_error(self.store.backend_name());
                tracing::warn!(
                    key = %key,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Counter store failed, rate limit skipped"
                );
                Err(e)
            }
        };
        Some(result)
    }
}

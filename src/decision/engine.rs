use crate::audit::{AuditEmitter, EventType, SecurityEvent};
use crate::decision::context::RequestContext;
use crate::decision::verdict::{decide, Action, Cause, Decision, Verdicts};
use crate::observability::metrics;
use crate::policy::PolicyConfig;
use crate::security::{RateLimiter, Verdict};

/// Runs the classifiers for one request and records the outcome.
///
/// The only awaited side effect is the counter store. Audit events are
/// handed to the emitter and never awaited.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    limiter: RateLimiter,
    audit: AuditEmitter,
}

impl DecisionEngine {
    pub fn new(limiter: RateLimiter, audit: AuditEmitter) -> Self {
        Self { limiter, audit }
    }

    pub fn audit(&self) -> &AuditEmitter {
        &self.audit
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn evaluate(
        &self,
        policy: &PolicyConfig,
        ctx: &RequestContext,
        body: &[u8],
    ) -> Decision {
        let route_class = policy.routes.classify(&ctx.path);
        let subject = ctx.address.to_string();

        for fallback in &ctx.fallbacks {
            let mut event = SecurityEvent::new(EventType::ClassificationFallback, &subject, &ctx.path)
                .with_field("request_id", ctx.request_id.as_str())
                .with_field("signal", fallback.signal());
            if let Some(raw) = fallback.raw_value() {
                event = event.with_field("value", raw);
            }
            self.audit.emit(event);
        }

        let bot_score = ctx.bot_score.unwrap_or(policy.missing_bot_score);
        let attack = policy.signatures.scan(&ctx.target, body);
        let geo = policy.geo.evaluate(&ctx.path, ctx.country.as_deref());
        let bot = policy.bot.evaluate(bot_score, ctx.verified_bot);

        // Traffic already decided by the scanner or geo policy does not
        // consume quota.
        let rate_limit = if attack.is_none() && geo == Verdict::Allow {
            let check = self
                .limiter
                .check(policy, route_class, ctx.address, ctx.principal.as_deref())
                .await;
            for error in &check.errors {
                self.audit.emit_sampled(
                    SecurityEvent::new(EventType::CounterStoreError, &subject, &ctx.path)
                        .with_field("request_id", ctx.request_id.as_str())
                        .with_field("backend", self.limiter.store().backend_name())
                        .with_field("error", error.to_string()),
                    self.audit.sampling().store_error_rate,
                );
            }
            check.exceeded().cloned()
        } else {
            None
        };

        let decision = decide(
            Verdicts {
                attack,
                geo,
                rate_limit,
                bot,
                country: ctx.country.clone(),
                bot_score,
            },
            policy.challenge_retry_after_secs,
        );

        metrics::record_decision(decision.action.as_str(), decision.cause.as_str());
        if let Cause::Attack(hit) = &decision.cause {
            metrics::record_signature_match(&hit.signature);
        }

        if decision.action == Action::Allow {
            tracing::debug!(
                request_id = %ctx.request_id,
                subject = %subject,
                route_class,
                action = decision.action.as_str(),
                "Request allowed"
            );
        } else {
            tracing::info!(
                request_id = %ctx.request_id,
                subject = %subject,
                route_class,
                action = decision.action.as_str(),
                reason = %decision.reason,
                "Request denied"
            );
        }

        self.record(ctx, &subject, route_class, bot_score, &decision);
        decision
    }

    fn record(
        &self,
        ctx: &RequestContext,
        subject: &str,
        route_class: &str,
        bot_score: u8,
        decision: &Decision,
    ) {
        // A principal-pass limit is attributed to the principal.
        let subject = match (&decision.cause, ctx.principal.as_deref()) {
            (Cause::RateLimited(pass), Some(principal)) if pass.subject_kind == "principal" => {
                principal
            }
            _ => subject,
        };
        let mut event = SecurityEvent::new(decision.cause.event_type(), subject, &ctx.path)
            .with_field("request_id", ctx.request_id.as_str())
            .with_field("address", ctx.address.to_string())
            .with_field("method", ctx.method.as_str())
            .with_field("route_class", route_class)
            .with_field("action", decision.action.as_str())
            .with_field("reason", decision.reason.as_str())
            .with_field("bot_score", bot_score)
            .with_field("verified_bot", ctx.verified_bot);
        if let Some(country) = &ctx.country {
            event = event.with_field("country", country.as_str());
        }

        match &decision.cause {
            Cause::Attack(hit) => {
                event = event
                    .with_field("signature", hit.signature.as_str())
                    .with_field("location", hit.location.as_str());
            }
            Cause::RateLimited(pass) => {
                event = event
                    .with_field("subject_kind", pass.subject_kind)
                    .with_field("count", pass.count)
                    .with_field("limit", pass.limit)
                    .with_field("window_seconds", pass.window_seconds);
            }
            _ => {}
        }

        if decision.action == Action::Allow {
            self.audit.emit_sampled(event, self.audit.sampling().allow_rate);
        } else {
            self.audit.emit(event);
        }
    }
}

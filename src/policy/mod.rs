//! Compiled enforcement policy.
//!
//! # Data Flow
//! ```text
//! GatewayConfig.policy (+ security.scan_body_bytes)
//!     → PolicyConfig::compile (regexes, header values, prefix matchers)
//!     → PolicyHandle (arc-swap)
//!     → every request loads one snapshot and uses it end to end
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable; reload builds a new one and swaps it in
//! - A request never observes a half-applied reload
//! - Lookups with no configured entry fall back to the `default` rule

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::validation::{validate_policy, ValidationError};
use crate::config::{GatewayConfig, RateLimitRule};
use crate::routing::{RouteClassifier, DEFAULT_ROUTE_CLASS};
use crate::security::{AttackSignatures, BotPolicy, GeoPolicy, SecurityHeaders};
use crate::store::clock::unix_now;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Invalid(Vec<ValidationError>),
    #[error("signature '{name}' failed to compile: {source}")]
    Signature { name: String, source: regex::Error },
    #[error("security header '{0}' is invalid")]
    Header(String),
}

/// Immutable policy snapshot read by every component on the request path.
#[derive(Debug)]
pub struct PolicyConfig {
    rate_limits: HashMap<String, RateLimitRule>,
    principal_rate_limits: HashMap<String, RateLimitRule>,
    pub routes: RouteClassifier,
    pub geo: GeoPolicy,
    pub bot: BotPolicy,
    pub signatures: AttackSignatures,
    pub headers: SecurityHeaders,
    pub missing_bot_score: u8,
    pub challenge_url: String,
    pub challenge_retry_after_secs: u64,
    /// Seconds since epoch when this snapshot was compiled.
    pub compiled_at: u64,
}

impl PolicyConfig {
    pub fn compile(config: &GatewayConfig) -> Result<Self, PolicyError> {
        let section = &config.policy;

        let mut errors = Vec::new();
        validate_policy(section, &mut errors);
        if !errors.is_empty() {
            return Err(PolicyError::Invalid(errors));
        }

        let signatures =
            AttackSignatures::compile(&section.signatures, config.security.scan_body_bytes)
                .map_err(|(name, source)| PolicyError::Signature { name, source })?;
        let headers =
            SecurityHeaders::compile(&section.security_headers).map_err(PolicyError::Header)?;

        Ok(Self {
            rate_limits: section.rate_limits.clone().into_iter().collect(),
            principal_rate_limits: section.principal_rate_limits.clone().into_iter().collect(),
            routes: RouteClassifier::from_config(&section.route_classes),
            geo: GeoPolicy::new(
                &section.blocked_countries,
                &section.allowed_countries,
                &section.sensitive_prefixes,
            ),
            bot: BotPolicy::new(section.bot),
            signatures,
            headers,
            missing_bot_score: section.missing_bot_score,
            challenge_url: section.challenge_url.clone(),
            challenge_retry_after_secs: section.challenge_retry_after_secs,
            compiled_at: unix_now(),
        })
    }

    /// Network-address rule for a route class, falling back to `default`.
    pub fn rate_rule(&self, route_class: &str) -> &RateLimitRule {
        self.rate_limits
            .get(route_class)
            .or_else(|| self.rate_limits.get(DEFAULT_ROUTE_CLASS))
            .unwrap_or(&FALLBACK_RULE)
    }

    /// Principal rule for a route class, falling back to `default`; `None`
    /// when no principal limits are configured.
    pub fn principal_rate_rule(&self, route_class: &str) -> Option<&RateLimitRule> {
        self.principal_rate_limits
            .get(route_class)
            .or_else(|| self.principal_rate_limits.get(DEFAULT_ROUTE_CLASS))
    }

    /// Network-address rules keyed by route class.
    pub fn rate_limits(&self) -> BTreeMap<&str, RateLimitRule> {
        self.rate_limits.iter().map(|(k, v)| (k.as_str(), *v)).collect()
    }

    pub fn principal_rate_limits(&self) -> BTreeMap<&str, RateLimitRule> {
        self.principal_rate_limits
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect()
    }
}

// Only reachable if a snapshot were built without validation.
const FALLBACK_RULE: RateLimitRule = RateLimitRule {
    requests: 120,
    window_seconds: 60,
    block_seconds: 60,
};

/// Shared, atomically swappable pointer to the current snapshot.
#[derive(Debug)]
pub struct PolicyHandle {
    current: ArcSwap<PolicyConfig>,
    generation: AtomicU64,
}

impl PolicyHandle {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
            generation: AtomicU64::new(1),
        }
    }

    /// Current snapshot; hold it for the whole request.
    pub fn load(&self) -> Arc<PolicyConfig> {
        self.current.load_full()
    }

    /// Install a new snapshot. Returns the new generation number.
    pub fn swap(&self, policy: PolicyConfig) -> u64 {
        self.current.store(Arc::new(policy));
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_fallback() {
        let policy = PolicyConfig::compile(&GatewayConfig::default()).unwrap();
        assert_eq!(policy.rate_rule("login").requests, 5);
        assert_eq!(policy.rate_rule("unknown-class").requests, 120);
        assert_eq!(policy.principal_rate_rule("generation").unwrap().requests, 100);
        assert_eq!(policy.principal_rate_rule("login").unwrap().requests, 1_000);
    }

    #[test]
    fn test_no_principal_limits() {
        let mut config = GatewayConfig::default();
        config.policy.principal_rate_limits.clear();
        let policy = PolicyConfig::compile(&config).unwrap();
        assert!(policy.principal_rate_rule("api").is_none());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut config = GatewayConfig::default();
        config.policy.rate_limits.clear();
        assert!(matches!(
            PolicyConfig::compile(&config),
            Err(PolicyError::Invalid(errors)) if errors == vec![ValidationError::MissingDefaultRule]
        ));
    }

    #[test]
    fn test_swap_bumps_generation() {
        let handle = PolicyHandle::new(PolicyConfig::compile(&GatewayConfig::default()).unwrap());
        let before = handle.load();
        assert_eq!(handle.generation(), 1);

        let mut config = GatewayConfig::default();
        config.policy.challenge_url = "/verify".to_string();
        assert_eq!(handle.swap(PolicyConfig::compile(&config).unwrap()), 2);

        assert_eq!(handle.load().challenge_url, "/verify");
        // Snapshots already handed out are unaffected.
        assert_eq!(before.challenge_url, "/challenge");
    }
}

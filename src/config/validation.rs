//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Check policy consistency (default rule present, country lists disjoint)
//! - Compile attack signatures before the config is accepted
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Uri;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, PolicySection, RateLimitRule, PLACEHOLDER_API_KEY};
use crate::security::geo::normalize_country_code;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    Address { field: &'static str, value: String },
    #[error("origin.url: '{0}' must be an absolute http(s) URL")]
    OriginUrl(String),
    #[error("policy.rate_limits must contain a 'default' rule")]
    MissingDefaultRule,
    #[error("{table}.{class}: requests and window_seconds must be greater than 0")]
    RateRule { table: &'static str, class: String },
    #[error("policy.bot: block_below ({block}) must not exceed challenge_below ({challenge}), both <= 100")]
    BotThresholds { block: u8, challenge: u8 },
    #[error("{field}: sample rate {value} must be within [0, 1]")]
    SampleRate { field: &'static str, value: f64 },
    #[error("{field}: '{value}' is not a two-letter country code")]
    CountryCode { field: &'static str, value: String },
    #[error("country '{0}' is both allowed and blocked")]
    CountryConflict(String),
    #[error("policy.signatures.{name}: {message}")]
    Signature { name: String, message: String },
    #[error("policy.security_headers.{0}: invalid header name or value")]
    SecurityHeader(String),
    #[error("admin.api_key must be changed when the admin API is enabled")]
    PlaceholderApiKey,
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == PLACEHOLDER_API_KEY || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderApiKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    match config.origin.url.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => {}
        _ => errors.push(ValidationError::OriginUrl(config.origin.url.clone())),
    }

    if config.listener.max_in_flight == 0 {
        errors.push(ValidationError::Zero("listener.max_in_flight"));
    }
    if config.audit.channel_capacity == 0 {
        errors.push(ValidationError::Zero("audit.channel_capacity"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.counter_store_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.counter_store_ms"));
    }

    check_rate(&mut errors, "audit.allow_sample_rate", config.audit.allow_sample_rate);
    check_rate(
        &mut errors,
        "audit.store_error_sample_rate",
        config.audit.store_error_sample_rate,
    );

    validate_policy(&config.policy, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Policy-only checks, shared by startup and hot reload.
pub fn validate_policy(policy: &PolicySection, errors: &mut Vec<ValidationError>) {
    if !policy.rate_limits.contains_key("default") {
        errors.push(ValidationError::MissingDefaultRule);
    }
    check_rules(errors, "policy.rate_limits", policy.rate_limits.iter());
    check_rules(
        errors,
        "policy.principal_rate_limits",
        policy.principal_rate_limits.iter(),
    );

    let bot = policy.bot;
    if bot.block_below > bot.challenge_below || bot.challenge_below > 100 {
        errors.push(ValidationError::BotThresholds {
            block: bot.block_below,
            challenge: bot.challenge_below,
        });
    }
    if policy.missing_bot_score > 100 {
        errors.push(ValidationError::BotThresholds {
            block: bot.block_below,
            challenge: policy.missing_bot_score,
        });
    }

    let blocked = check_countries(errors, "policy.blocked_countries", &policy.blocked_countries);
    let allowed = check_countries(errors, "policy.allowed_countries", &policy.allowed_countries);
    for code in &blocked {
        if allowed.contains(code) {
            errors.push(ValidationError::CountryConflict(code.clone()));
        }
    }

    for sig in &policy.signatures {
        if let Err(e) = regex::Regex::new(&sig.pattern) {
            errors.push(ValidationError::Signature {
                name: sig.name.clone(),
                message: e.to_string(),
            });
        }
    }

    for (name, value) in &policy.security_headers {
        let name_ok = axum::http::HeaderName::from_bytes(name.as_bytes()).is_ok();
        let value_ok = axum::http::HeaderValue::from_str(value).is_ok();
        if !name_ok || !value_ok {
            errors.push(ValidationError::SecurityHeader(name.clone()));
        }
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field,
            value: value.to_string(),
        });
    }
}

fn check_rate(errors: &mut Vec<ValidationError>, field: &'static str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::SampleRate { field, value });
    }
}

fn check_rules<'a>(
    errors: &mut Vec<ValidationError>,
    table: &'static str,
    rules: impl Iterator<Item = (&'a String, &'a RateLimitRule)>,
) {
    for (class, rule) in rules {
        if rule.requests == 0 || rule.window_seconds == 0 {
            errors.push(ValidationError::RateRule {
                table,
                class: class.clone(),
            });
        }
    }
}

fn check_countries(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    values: &[String],
) -> Vec<String> {
    let mut normalized = Vec::with_capacity(values.len());
    for value in values {
        match normalize_country_code(value) {
            Some(code) => normalized.push(code),
            None => errors.push(ValidationError::CountryCode {
                field,
                value: value.clone(),
            }),
        }
    }
    normalized
}

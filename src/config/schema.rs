//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, in-flight ceiling).
    pub listener: ListenerConfig,

    /// Origin service that allowed traffic is forwarded to.
    pub origin: OriginConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Counter store backend used by the rate limiter.
    pub counter_store: CounterStoreConfig,

    /// Audit event pipeline.
    pub audit: AuditConfig,

    /// Names of the edge-provided request signal headers.
    pub signals: SignalHeadersConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Hot-reloadable enforcement policy.
    pub policy: PolicySection,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum requests processed concurrently (backpressure).
    pub max_in_flight: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_in_flight: 10_000,
        }
    }
}

/// Origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the origin (scheme and authority are used).
    pub url: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upper bound on a single counter store round trip, in milliseconds.
    pub counter_store_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            counter_store_ms: 50,
        }
    }
}

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CounterStoreConfig {
    pub backend: BackendKind,

    /// Redis connection URL (used when `backend = "redis"`).
    pub redis_url: String,

    /// Prefix prepended to every counter key.
    pub key_prefix: String,

    /// Seconds added to the window when setting a record's TTL.
    pub ttl_buffer_secs: u64,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gateway:rl:".to_string(),
            ttl_buffer_secs: 60,
        }
    }
}

/// Audit pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub sink: BackendKind,

    /// Capacity of the hand-off channel between request path and worker.
    pub channel_capacity: usize,

    /// Fraction of allowed requests that produce an event (0.0 - 1.0).
    pub allow_sample_rate: f64,

    /// Fraction of counter store failures that produce an event (0.0 - 1.0).
    pub store_error_sample_rate: f64,

    /// Events retained by the sink.
    pub max_events: usize,

    /// Redis list key (used when `sink = "redis"`).
    pub redis_key: String,

    /// Redis connection URL (used when `sink = "redis"`).
    pub redis_url: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: BackendKind::Memory,
            channel_capacity: 4096,
            allow_sample_rate: 0.01,
            store_error_sample_rate: 0.1,
            max_events: 10_000,
            redis_key: "gateway:events".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Header names carrying edge-supplied request signals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalHeadersConfig {
    pub client_ip: String,
    pub forwarded_for: String,
    pub country: String,
    pub bot_score: String,
    pub verified_bot: String,
}

impl Default for SignalHeadersConfig {
    fn default() -> Self {
        Self {
            client_ip: "cf-connecting-ip".to_string(),
            forwarded_for: "x-forwarded-for".to_string(),
            country: "cf-ipcountry".to_string(),
            bot_score: "cf-bot-score".to_string(),
            verified_bot: "cf-verified-bot".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Leading body bytes inspected by the attack scanner.
    pub scan_body_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            scan_body_bytes: 8 * 1024,
        }
    }
}

/// One rate-limit rule: `requests` per trailing `window_seconds`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub requests: u64,
    pub window_seconds: u64,
    /// Returned to clients as the retry hint once exceeded.
    pub block_seconds: u64,
}

/// A named bucket of routes sharing rate-limit policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteClassConfig {
    pub name: String,
    pub path_prefixes: Vec<String>,
}

/// A named attack signature (regular expression, matched case-insensitively).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureConfig {
    pub name: String,
    pub pattern: String,
}

/// Bot-score floors. Scores below `block_below` block, below `challenge_below` challenge.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BotThresholds {
    pub block_below: u8,
    pub challenge_below: u8,
}

impl Default for BotThresholds {
    fn default() -> Self {
        Self {
            block_below: 10,
            challenge_below: 30,
        }
    }
}

/// Enforcement policy as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySection {
    /// Per route class limits keyed by network address. Must contain `default`.
    pub rate_limits: BTreeMap<String, RateLimitRule>,

    /// Per route class limits keyed by authenticated principal.
    pub principal_rate_limits: BTreeMap<String, RateLimitRule>,

    pub route_classes: Vec<RouteClassConfig>,

    pub blocked_countries: Vec<String>,
    pub allowed_countries: Vec<String>,
    pub sensitive_prefixes: Vec<String>,

    pub bot: BotThresholds,

    /// Score assumed when the bot score header is missing or malformed.
    pub missing_bot_score: u8,

    pub security_headers: BTreeMap<String, String>,

    pub signatures: Vec<SignatureConfig>,

    /// Where challenged clients are sent.
    pub challenge_url: String,

    /// Retry hint attached to challenge responses.
    pub challenge_retry_after_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        let rule = |requests, window_seconds, block_seconds| RateLimitRule {
            requests,
            window_seconds,
            block_seconds,
        };

        let rate_limits = BTreeMap::from([
            ("default".to_string(), rule(120, 60, 60)),
            ("api".to_string(), rule(100, 60, 60)),
            ("login".to_string(), rule(5, 60, 600)),
            ("generation".to_string(), rule(10, 60, 300)),
        ]);

        let principal_rate_limits = BTreeMap::from([
            ("default".to_string(), rule(1_000, 3_600, 300)),
            ("generation".to_string(), rule(100, 3_600, 900)),
        ]);

        let route_classes = vec![
            RouteClassConfig {
                name: "login".to_string(),
                path_prefixes: vec![
                    "/api/auth/login".to_string(),
                    "/api/auth/register".to_string(),
                    "/api/auth/reset".to_string(),
                ],
            },
            RouteClassConfig {
                name: "generation".to_string(),
                path_prefixes: vec!["/api/generate".to_string()],
            },
            RouteClassConfig {
                name: "api".to_string(),
                path_prefixes: vec!["/api".to_string()],
            },
        ];

        let security_headers = BTreeMap::from([
            ("X-Frame-Options".to_string(), "DENY".to_string()),
            ("X-Content-Type-Options".to_string(), "nosniff".to_string()),
            ("X-XSS-Protection".to_string(), "1; mode=block".to_string()),
            (
                "Referrer-Policy".to_string(),
                "strict-origin-when-cross-origin".to_string(),
            ),
            (
                "Content-Security-Policy".to_string(),
                "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; frame-ancestors 'none'".to_string(),
            ),
            (
                "Strict-Transport-Security".to_string(),
                "max-age=31536000; includeSubDomains; preload".to_string(),
            ),
            (
                "Permissions-Policy".to_string(),
                "camera=(), microphone=(), geolocation=()".to_string(),
            ),
        ]);

        Self {
            rate_limits,
            principal_rate_limits,
            route_classes,
            blocked_countries: vec!["KP".to_string()],
            allowed_countries: ["US", "CA", "GB", "DE", "FR", "NL", "AU", "JP"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            sensitive_prefixes: vec![
                "/api/auth".to_string(),
                "/api/admin".to_string(),
                "/api/billing".to_string(),
            ],
            bot: BotThresholds::default(),
            missing_bot_score: 100,
            security_headers,
            signatures: default_signatures(),
            challenge_url: "/challenge".to_string(),
            challenge_retry_after_secs: 30,
        }
    }
}

/// Built-in attack signatures: SQL injection, path traversal, script injection
/// and command injection.
pub fn default_signatures() -> Vec<SignatureConfig> {
    let sig = |name: &str, pattern: &str| SignatureConfig {
        name: name.to_string(),
        pattern: pattern.to_string(),
    };

    vec![
        sig("sqli_union_select", r"union(\s|\+|/\*.*?\*/)+(all(\s|\+)+)?select"),
        sig("sqli_tautology", r"'\s*(or|and)\s+'?\w*'?\s*=\s*'?\w*"),
        sig("sqli_numeric_tautology", r"\bor(\s|\+)+1(\s|\+)*=(\s|\+)*1\b"),
        sig(
            "sqli_stacked_query",
            r";\s*((drop|truncate|alter)\s+(table|database)|delete\s+from|insert\s+into|update\s+\w+\s+set)\b",
        ),
        sig("sqli_time_based", r"\b(sleep|benchmark|pg_sleep)\s*\(|waitfor\s+delay"),
        sig("sqli_schema_probe", r"information_schema|sys\.(tables|columns)"),
        sig("path_traversal", r"\.\./|\.\.\\|%2e%2e(%2f|%5c|/)|\.\.%2f|\.\.%5c"),
        sig("sensitive_file", r"/etc/(passwd|shadow)|win\.ini|/proc/self/"),
        sig("xss_script_tag", r"<\s*script|%3cscript"),
        sig("xss_javascript_uri", r"javascript\s*:"),
        sig("xss_event_handler", r"\bon(error|load|mouseover|focus)\s*="),
        sig("cmd_injection_chain", r"(;|\||&&)\s*(cat|ls|whoami|wget|curl|nc|bash|sh|rm)\s"),
        sig(
            "cmd_injection_subshell",
            r"(\$\(|`)\s*(cat|ls|whoami|wget|curl|nc|bash|sh|rm|id)\b",
        ),
    ]
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder admin key; validation refuses it when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

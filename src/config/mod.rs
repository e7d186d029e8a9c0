//! Gateway configuration.
//!
//! # Data Flow
//! ```text
//! gateway.toml ─► loader.rs (serde, toml) ─► validation.rs (all errors at once)
//!                                              │
//!                                              ▼
//!                                        GatewayConfig ─► PolicyConfig::compile
//!
//! file modified ─► watcher.rs (notify) ─► reload + validate ─► mpsc ─► server
//!                                                                └─► PolicyHandle::swap
//! ```
//!
//! # Design Decisions
//! - Every section defaults, so an empty file is a valid configuration
//! - Only the policy section takes effect without a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, BackendKind, BotThresholds, CounterStoreConfig, GatewayConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, OriginConfig, PolicySection, RateLimitRule,
    RouteClassConfig, SecurityConfig, SignalHeadersConfig, SignatureConfig, TimeoutConfig,
};

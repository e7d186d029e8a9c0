//! Logs, metrics and request spans.
//!
//! # Data Flow
//! ```text
//! decision engine ─┐
//! audit pipeline  ─┼─► metrics.rs ─► Prometheus exporter (scrape)
//! counter store   ─┤
//! http handler    ─┴─► tracing events ─► logging.rs subscriber (pretty | json)
//!                        └─ tracing.rs: span per request, keyed by x-request-id
//! ```
//!
//! # Design Decisions
//! - Metric helpers take static label values where possible
//! - Without an installed recorder the metric calls are no-ops, so tests need no setup

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::init_logging;

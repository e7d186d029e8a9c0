//! Security subsystem: the per-request classifiers.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → scanner.rs (attack signatures over target + body prefix)
//!     → geo.rs (country × sensitive route)
//!     → rate_limit.rs (sliding-window counters via the counter store)
//!     → bot.rs (external bot score + verified flag)
//!     → decision engine combines the verdicts
//!     → headers.rs decorates every response
//! ```
//!
//! # Design Decisions
//! - Scanner, geo and bot classifiers are pure functions of the policy snapshot
//! - The rate limiter is the only classifier with side effects
//! - Rate limiting fails open; it shapes abuse, it is not a security boundary

pub mod bot;
pub mod geo;
pub mod headers;
pub mod rate_limit;
pub mod scanner;

use serde::Serialize;

/// Outcome of a three-way classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Challenge,
    Block,
}

pub use bot::BotPolicy;
pub use geo::GeoPolicy;
pub use headers::SecurityHeaders;
pub use rate_limit::{LimitPass, RateLimitCheck, RateLimiter};
pub use scanner::{AttackSignatures, SignatureMatch};

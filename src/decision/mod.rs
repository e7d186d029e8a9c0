//! # Decision Subsystem
//!
//! Composes the classifiers into one terminal action per request.
//!
//! ## Data Flow
//!
//! ```text
//! RequestContext + body prefix
//!     → AttackSignatures::scan
//!     → GeoPolicy::evaluate
//!     → RateLimiter::check      (skipped when already decided)
//!     → BotPolicy::evaluate
//!     → decide()                (pure precedence)
//!     → AuditEmitter            (fire and forget)
//!     → Decision
//! ```
//!
//! ## Design Decisions
//!
//! - `decide` is pure; all I/O happens before it in `DecisionEngine`
//! - Precedence: attack > geo block > geo challenge > rate limit > bot block > bot challenge > allow
//! - One policy snapshot is used for the whole evaluation

pub mod context;
pub mod engine;
pub mod verdict;

pub use context::{RequestContext, SignalFallback};
pub use engine::DecisionEngine;
pub use verdict::{decide, Action, Cause, Decision, Verdicts};

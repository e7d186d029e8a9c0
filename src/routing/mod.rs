//! Routing subsystem: maps request paths to route classes.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → router.rs (route-class lookup)
//!     → matcher.rs (evaluate prefix conditions)
//!     → Return: route class name ("login", "api", ..., or "default")
//!
//! Compilation (at policy load):
//!     RouteClassConfig[]
//!     → Compile prefix matchers
//!     → Sort by specificity
//!     → Freeze as immutable RouteClassifier inside PolicyConfig
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always maps to the same class

pub mod matcher;
pub mod router;

pub use router::{RouteClassifier, DEFAULT_ROUTE_CLASS};

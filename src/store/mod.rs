//! Counter store client.
//!
//! # Data Flow
//! ```text
//! RateLimiter
//!     → CounterStore::increment_and_count(key, window)
//!         read CounterRecord (or empty)
//!         → prune timestamps outside [now - window, now]
//!         → append now
//!         → persist with TTL = window + buffer
//!         → return remaining count
//! ```
//!
//! # Design Decisions
//! - Read-prune-append-write is not atomic across edge nodes; concurrent
//!   increments for one key may undercount for a cycle. Counts are
//!   approximate by contract.
//! - An unavailable store or an unreadable record is an error, never a
//!   silent zero
//! - Backends are pluggable behind the `CounterStore` trait

pub mod clock;
pub mod memory;
pub mod redis_store;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;

/// Errors surfaced by counter store backends.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
    #[error("counter store backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("corrupt counter record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// The entity being rate limited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Client network address.
    Address(IpAddr),
    /// Opaque authenticated principal identifier.
    Principal(String),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::Address(_) => "ip",
            Subject::Principal(_) => "principal",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Address(addr) => write!(f, "{addr}"),
            Subject::Principal(id) => write!(f, "{id}"),
        }
    }
}

/// Addresses one counter record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub route_class: String,
    pub subject: Subject,
}

impl RateLimitKey {
    pub fn new(route_class: impl Into<String>, subject: Subject) -> Self {
        Self {
            route_class: route_class.into(),
            subject,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.route_class, self.subject.kind(), self.subject)
    }
}

/// Request timestamps (seconds since epoch) inside the trailing window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterRecord {
    timestamps: Vec<u64>,
}

impl CounterRecord {
    /// Drop timestamps outside `[now - window, now]`.
    pub fn prune(&mut self, now: u64, window_seconds: u64) {
        let floor = now.saturating_sub(window_seconds);
        self.timestamps.retain(|&ts| ts >= floor && ts <= now);
    }

    /// Prune, record `now`, and return the resulting count.
    pub fn record(&mut self, now: u64, window_seconds: u64) -> u64 {
        self.prune(now, window_seconds);
        self.timestamps.push(now);
        self.timestamps.len() as u64
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Approximate sliding-window counter storage.
#[async_trait]
pub trait CounterStore: Send + Sync + fmt::Debug {
    /// Record one request for `key` and return how many fall inside the
    /// trailing `window_seconds`, including this one.
    async fn increment_and_count(
        &self,
        key: &RateLimitKey,
        window_seconds: u64,
    ) -> Result<u64, CounterStoreError>;

    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Drop expired records held in process. Backends with server-side
    /// expiry have nothing to do.
    fn purge_expired(&self) -> usize {
        0
    }
}

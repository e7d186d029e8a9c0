//! # Audit Subsystem
//!
//! Records security outcomes without putting persistence on the request path.
//!
//! ## Data Flow
//!
//! ```text
//! DecisionEngine ──emit()──► bounded mpsc ──► AuditWorker ──► AuditSink
//!        │                        │                            ├─ MemoryAuditStore
//!        └── never awaits         └── full: drop + count       └─ RedisAuditSink
//! ```
//!
//! ## Design Decisions
//!
//! - `try_send` only. A slow or failed sink loses events, never latency.
//! - Allowed requests and counter-store errors are sampled; every other
//!   event class is always emitted.
//! - Summaries are computed from stored events at query time.

pub mod emitter;
pub mod event;
pub mod redis_sink;
pub mod sink;
pub mod worker;

pub use emitter::{AuditEmitter, Sampling};
pub use event::{AnalyticsSummary, EventType, SecurityEvent};
pub use redis_sink::RedisAuditSink;
pub use sink::{AuditError, AuditSink, MemoryAuditStore};
pub use worker::AuditWorker;

//! Request-path side of the audit pipeline.
//!
//! `emit` hands the event to a bounded channel with `try_send` and returns
//! immediately. A full or closed channel drops the event and counts it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audit::event::SecurityEvent;
use crate::observability::metrics;

/// Sampling rates for high-volume event classes.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub allow_rate: f64,
    pub store_error_rate: f64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            allow_rate: 0.0,
            store_error_rate: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct EmitterStats {
    queued: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct AuditEmitter {
    tx: mpsc::Sender<SecurityEvent>,
    sampling: Sampling,
    stats: Arc<EmitterStats>,
}

impl AuditEmitter {
    /// Create an emitter and the receiver its worker drains.
    pub fn channel(capacity: usize, sampling: Sampling) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                sampling,
                stats: Arc::new(EmitterStats::default()),
            },
            rx,
        )
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    /// Queue an event without waiting. Never fails the caller.
    pub fn emit(&self, event: SecurityEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                metrics::record_audit_event("queued");
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_audit_event("dropped");
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "channel full",
                    mpsc::error::TrySendError::Closed(_) => "worker stopped",
                };
                tracing::debug!(reason, "Audit event dropped");
            }
        }
    }

    /// Queue the event with probability `rate`.
    pub fn emit_sampled(&self, event: SecurityEvent, rate: f64) {
        if sampled(rate) {
            self.emit(event);
        }
    }

    pub fn queued(&self) -> u64 {
        self.stats.queued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

fn sampled(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        fastrand::f64() < rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::EventType;

    fn event() -> SecurityEvent {
        SecurityEvent::new(EventType::BotBlocked, "1.2.3.4", "/")
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (emitter, mut rx) = AuditEmitter::channel(2, Sampling::default());

        for _ in 0..5 {
            emitter.emit(event());
        }

        assert_eq!(emitter.queued(), 2);
        assert_eq!(emitter.dropped(), 3);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_channel_counts_drop() {
        let (emitter, rx) = AuditEmitter::channel(8, Sampling::default());
        drop(rx);
        emitter.emit(event());
        assert_eq!(emitter.dropped(), 1);
    }

    #[test]
    fn test_sampling_edges() {
        let (emitter, mut rx) = AuditEmitter::channel(16, Sampling::default());
        for _ in 0..10 {
            emitter.emit_sampled(event(), 0.0);
        }
        assert_eq!(emitter.queued(), 0);

        for _ in 0..10 {
            emitter.emit_sampled(event(), 1.0);
        }
        assert_eq!(emitter.queued(), 10);
        assert!(rx.try_recv().is_ok());
    }
}

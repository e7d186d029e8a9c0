//! Audit sink port and its in-memory implementation.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::audit::event::{AnalyticsSummary, SecurityEvent};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("audit event encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Durable destination for security events.
#[async_trait]
pub trait AuditSink: Send + Sync + Debug {
    async fn record(&self, event: SecurityEvent) -> Result<(), AuditError>;

    async fn summarize(&self, from: u64, to: u64) -> Result<AnalyticsSummary, AuditError>;

    /// Most recent events, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEvent>, AuditError>;

    fn backend_name(&self) -> &'static str;
}

/// Bounded ring buffer. Oldest events are evicted first.
#[derive(Debug)]
pub struct MemoryAuditStore {
    events: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
}

impl MemoryAuditStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditStore {
    async fn record(&self, event: SecurityEvent) -> Result<(), AuditError> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    async fn summarize(&self, from: u64, to: u64) -> Result<AnalyticsSummary, AuditError> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(AnalyticsSummary::from_events(events.iter(), from, to))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEvent>, AuditError> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::EventType;

    #[tokio::test]
    async fn test_ring_buffer_evicts_oldest() {
        let store = MemoryAuditStore::new(3);
        for ts in 1..=5 {
            store
                .record(SecurityEvent::new(EventType::RateLimited, "s", "/").at(ts))
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 3);
        let recent = store.recent(10).await.unwrap();
        let stamps: Vec<u64> = recent.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_summarize_uses_inclusive_bounds() {
        let store = MemoryAuditStore::new(10);
        store
            .record(SecurityEvent::new(EventType::GeoBlocked, "s", "/").at(100))
            .await
            .unwrap();
        store
            .record(SecurityEvent::new(EventType::GeoBlocked, "s", "/").at(200))
            .await
            .unwrap();

        let summary = store.summarize(100, 200).await.unwrap();
        assert_eq!(summary.blocks, 2);

        let summary = store.summarize(101, 199).await.unwrap();
        assert_eq!(summary.total, 0);
    }
}

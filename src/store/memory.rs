//! In-process counter store.
//!
//! Single-node deployments and tests. Records expire lazily on access and
//! in bulk through [`CounterStore::purge_expired`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::{Clock, CounterRecord, CounterStore, CounterStoreError, RateLimitKey};

#[derive(Debug)]
struct Entry {
    record: CounterRecord,
    expires_at: u64,
}

#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    ttl_buffer_secs: u64,
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>, ttl_buffer_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl_buffer_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_and_count(
        &self,
        key: &RateLimitKey,
        window_seconds: u64,
    ) -> Result<u64, CounterStoreError> {
        let now = self.clock.now_secs();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            record: CounterRecord::default(),
            expires_at: 0,
        });

        if entry.expires_at <= now {
            entry.record = CounterRecord::default();
        }

        let count = entry.record.record(now, window_seconds);
        entry.expires_at = now + window_seconds + self.ttl_buffer_secs;
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        // Counted inside retain: other shards may gain keys while it runs.
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }
}

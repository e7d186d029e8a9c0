//! Startup orchestration.
//!
//! Builds the configured counter store and audit sink. Backend connection
//! failures are fatal here; at request time the same failures fail open.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, MemoryAuditStore, RedisAuditSink};
use crate::config::{BackendKind, GatewayConfig};
use crate::error::StartupError;
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore, SystemClock};

pub async fn build_counter_store(
    config: &GatewayConfig,
) -> Result<Arc<dyn CounterStore>, StartupError> {
    let section = &config.counter_store;
    let clock = Arc::new(SystemClock);

    let store: Arc<dyn CounterStore> = match section.backend {
        BackendKind::Memory => Arc::new(MemoryCounterStore::new(clock, section.ttl_buffer_secs)),
        BackendKind::Redis => Arc::new(
            RedisCounterStore::connect(
                &section.redis_url,
                &section.key_prefix,
                section.ttl_buffer_secs,
                Duration::from_millis(config.timeouts.counter_store_ms),
                clock,
            )
            .await?,
        ),
    };

    tracing::info!(backend = store.backend_name(), "Counter store ready");
    Ok(store)
}

pub async fn build_audit_sink(config: &GatewayConfig) -> Result<Arc<dyn AuditSink>, StartupError> {
    let section = &config.audit;

    let sink: Arc<dyn AuditSink> = match section.sink {
        BackendKind::Memory => Arc::new(MemoryAuditStore::new(section.max_events)),
        BackendKind::Redis => Arc::new(
            RedisAuditSink::connect(&section.redis_url, &section.redis_key, section.max_events)
                .await?,
        ),
    };

    tracing::info!(sink = sink.backend_name(), "Audit sink ready");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backends_by_default() {
        let config = GatewayConfig::default();
        let store = build_counter_store(&config).await.unwrap();
        let sink = build_audit_sink(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(sink.backend_name(), "memory");
    }
}

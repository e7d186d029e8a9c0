//! Redis-backed counter store shared by every edge node.
//!
//! Each key holds a JSON array of timestamps written with `SET .. EX`. The
//! GET → prune → SET sequence is not atomic; concurrent nodes may undercount
//! by one cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Cmd};

use crate::store::{Clock, CounterRecord, CounterStore, CounterStoreError, RateLimitKey};

/// Floor for the initial connection; per-call timeouts are far tighter.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    key_prefix: String,
    ttl_buffer_secs: u64,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .field("ttl_buffer_secs", &self.ttl_buffer_secs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the initial connection fails.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        ttl_buffer_secs: u64,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CounterStoreError> {
        let client = Client::open(url)?;
        let connection = tokio::time::timeout(
            timeout.max(MIN_CONNECT_TIMEOUT),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CounterStoreError::Unavailable(format!("connect to {url} timed out")))??;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            ttl_buffer_secs,
            timeout,
            clock,
        })
    }

    async fn read_prune_write(
        &self,
        key: &RateLimitKey,
        window_seconds: u64,
    ) -> Result<u64, CounterStoreError> {
        let redis_key = counter_key(&self.key_prefix, key);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&redis_key).await?;
        let mut record = match decode_record(raw.as_deref()) {
            Ok(record) => record,
            Err(e) => {
                // Drop the record so the next request starts a fresh window.
                let _: () = conn.del(&redis_key).await?;
                return Err(CounterStoreError::Corrupt {
                    key: redis_key,
                    reason: e.to_string(),
                });
            }
        };

        let count = record.record(self.clock.now_secs(), window_seconds);
        let payload = serde_json::to_string(&record)
            .map_err(|e| CounterStoreError::Unavailable(e.to_string()))?;

        let _: () = set_command(&redis_key, &payload, record_ttl(window_seconds, self.ttl_buffer_secs))
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_count(
        &self,
        key: &RateLimitKey,
        window_seconds: u64,
    ) -> Result<u64, CounterStoreError> {
        tokio::time::timeout(self.timeout, self.read_prune_write(key, window_seconds))
            .await
            .map_err(|_| CounterStoreError::Timeout(self.timeout))?
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn counter_key(prefix: &str, key: &RateLimitKey) -> String {
    format!("{prefix}{key}")
}

fn record_ttl(window_seconds: u64, ttl_buffer_secs: u64) -> u64 {
    window_seconds.saturating_add(ttl_buffer_secs)
}

fn decode_record(raw: Option<&str>) -> Result<CounterRecord, serde_json::Error> {
    match raw {
        Some(json) => serde_json::from_str(json),
        None => Ok(CounterRecord::default()),
    }
}

fn set_command(key: &str, payload: &str, ttl_secs: u64) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(payload).arg("EX").arg(ttl_secs);
    cmd
}

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::audit::event::{AnalyticsSummary, SecurityEvent};
use crate::audit::sink::{AuditError, AuditSink};

/// Capped Redis list of JSON-encoded events, newest at the head.
#[derive(Clone)]
pub struct RedisAuditSink {
    conn: ConnectionManager,
    key: String,
    max_events: usize,
}

impl RedisAuditSink {
    pub async fn connect(url: &str, key: &str, max_events: usize) -> Result<Self, AuditError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: key.to_string(),
            max_events: max_events.max(1),
        })
    }

    async fn load(&self, limit: isize) -> Result<Vec<SecurityEvent>, AuditError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&self.key, 0, limit).await?;

        let mut events = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<SecurityEvent>(&entry) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable audit entry"),
            }
        }
        Ok(events)
    }
}

impl std::fmt::Debug for RedisAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAuditSink")
            .field("key", &self.key)
            .field("max_events", &self.max_events)
            .finish()
    }
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn record(&self, event: SecurityEvent) -> Result<(), AuditError> {
        let payload = serde_json::to_string(&event)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .lpush(&self.key, payload)
            .ignore()
            .ltrim(&self.key, 0, self.max_events as isize - 1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn summarize(&self, from: u64, to: u64) -> Result<AnalyticsSummary, AuditError> {
        let events = self.load(-1).await?;
        Ok(AnalyticsSummary::from_events(events.iter(), from, to))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<SecurityEvent>, AuditError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.load(limit as isize - 1).await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

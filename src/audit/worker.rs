use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::audit::event::SecurityEvent;
use crate::audit::sink::AuditSink;
use crate::observability::metrics;

/// Drains the audit channel into a sink, off the request path.
pub struct AuditWorker {
    rx: mpsc::Receiver<SecurityEvent>,
    sink: Arc<dyn AuditSink>,
}

impl AuditWorker {
    pub fn new(rx: mpsc::Receiver<SecurityEvent>, sink: Arc<dyn AuditSink>) -> Self {
        Self { rx, sink }
    }

    /// Run until every emitter is gone or shutdown fires. Events already
    /// queued at shutdown are flushed before returning.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(sink = self.sink.backend_name(), "Audit worker started");

        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    let mut flushed = 0usize;
                    while let Ok(event) = self.rx.try_recv() {
                        self.deliver(event).await;
                        flushed += 1;
                    }
                    tracing::info!(flushed, "Audit worker flushed pending events");
                    break;
                }
            }
        }

        tracing::info!("Audit worker stopped");
    }

    async fn deliver(&self, event: SecurityEvent) {
        let event_type = event.event_type.as_str();
        match self.sink.record(event).await {
            Ok(()) => metrics::record_audit_event("written"),
            Err(e) => {
                metrics::record_audit_event("sink_error");
                tracing::warn!(error = %e, event_type, "Failed to persist audit event");
            }
        }
    }
}

//! Shutdown coordination.

use tokio::sync::broadcast;

/// Fan-out stop signal. Cloning shares the same channel, so any clone may
/// trigger and every subscriber observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Idempotent.
    pub fn trigger(&self) {
        if self.notify.send(()).is_ok() {
            tracing::info!(subscribers = self.notify.receiver_count(), "Shutdown triggered");
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.notify.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_triggers_shared_channel() {
        let shutdown = Shutdown::new();
        let mut gateway = shutdown.subscribe();
        let mut worker = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.clone().trigger();
        assert!(gateway.recv().await.is_ok());
        assert!(worker.recv().await.is_ok());
    }
}

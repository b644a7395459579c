use crate::{BusResult, EventBus, EventHandler};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory realization of [`EventBus`].
///
/// Subscribers are held as `Arc<dyn EventHandler>` in per-topic, insertion-
/// ordered vectors behind a `parking_lot::RwLock`. `publish` takes a read
/// lock just long enough to clone the subscriber list (cheap — cloning an
/// `Arc`), then calls each handler sequentially so a topic's fan-out is
/// FIFO with respect to a single publisher. A handler that returns an
/// error is logged and skipped; it never aborts the fan-out to the
/// remaining subscribers.
#[derive(Clone, Default)]
pub struct InProcessBus {
    subscribers: Arc<RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers currently registered for `topic` (test/observability hook).
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .get(topic)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, topic: &str, event: serde_json::Value) -> BusResult<()> {
        let handlers = {
            let guard = self.subscribers.read();
            guard.get(topic).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(topic, "publish with no subscribers");
            return Ok(());
        }

        for (idx, handler) in handlers.iter().enumerate() {
            match handler.handle(event.clone()).await {
                Ok(()) => debug!(topic, subscriber = idx, "event delivered"),
                Err(err) => warn!(
                    topic,
                    subscriber = idx,
                    error = %err,
                    "subscriber handler failed, isolated from other subscribers"
                ),
            }
        }

        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        let mut guard = self.subscribers.write();
        guard.entry(topic.to_string()).or_default().push(handler);
    }
}

//! Out-of-core mock delivery collaborator.
//!
//! A real deployment gets `order.shipped`/`order.delivered` events from an
//! external fulfillment system publishing onto the bus. Nothing in the
//! reliability core depends on how those events are produced; this
//! module is a placeholder for local runs and tests so `delivery-events`
//! carries traffic without a second service. It subscribes to
//! `order-events`, and for every `order.created` it sees, publishes a
//! `order.shipped` and then `order.delivered` event for the same order a
//! short, fixed delay apart.

use async_trait::async_trait;
use event_bus::{topics, EventBus, EventHandler};
use order_domain::DeliveryStatusEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct DeliverySimulatorConfig {
    pub shipped_after: Duration,
    pub delivered_after: Duration,
}

impl Default for DeliverySimulatorConfig {
    fn default() -> Self {
        Self {
            shipped_after: Duration::from_secs(2),
            delivered_after: Duration::from_secs(5),
        }
    }
}

pub struct DeliverySimulator {
    bus: Arc<dyn EventBus>,
    config: DeliverySimulatorConfig,
}

impl DeliverySimulator {
    pub fn new(bus: Arc<dyn EventBus>, config: DeliverySimulatorConfig) -> Self {
        Self { bus, config }
    }

    fn build_event(event_type: &str, order_id: Uuid) -> serde_json::Value {
        let event = DeliveryStatusEvent {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: chrono::Utc::now(),
            order_id,
        };
        serde_json::to_value(&event).unwrap_or_default()
    }
}

#[async_trait]
impl EventHandler for DeliverySimulator {
    async fn handle(&self, event: serde_json::Value) -> anyhow::Result<()> {
        if event.get("eventType").and_then(|v| v.as_str()) != Some("order.created") {
            return Ok(());
        }

        let order_id = event
            .get("orderId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        let Some(order_id) = order_id else {
            warn!("order.created event missing orderId, skipping delivery simulation");
            return Ok(());
        };

        let bus = self.bus.clone();
        let shipped_after = self.config.shipped_after;
        let delivered_after = self.config.delivered_after;

        tokio::spawn(async move {
            tokio::time::sleep(shipped_after).await;
            let shipped = Self::build_event(DeliveryStatusEvent::SHIPPED, order_id);
            if let Err(e) = bus.publish(topics::DELIVERY_EVENTS, shipped).await {
                warn!(order_id = %order_id, error = %e, "simulated shipped publish failed");
            } else {
                debug!(order_id = %order_id, "simulated order.shipped published");
            }

            tokio::time::sleep(delivered_after - shipped_after.min(delivered_after)).await;
            let delivered = Self::build_event(DeliveryStatusEvent::DELIVERED, order_id);
            if let Err(e) = bus.publish(topics::DELIVERY_EVENTS, delivered).await {
                warn!(order_id = %order_id, error = %e, "simulated delivered publish failed");
            } else {
                debug!(order_id = %order_id, "simulated order.delivered published");
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InProcessBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    struct CountingHandler {
        count: StdArc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: serde_json::Value) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_shipped_then_delivered_after_order_created() {
        let bus: Arc<InProcessBus> = Arc::new(InProcessBus::new());
        let count = StdArc::new(AtomicUsize::new(0));
        bus.subscribe(
            topics::DELIVERY_EVENTS,
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        );

        let simulator = DeliverySimulator::new(
            bus.clone() as Arc<dyn EventBus>,
            DeliverySimulatorConfig {
                shipped_after: Duration::from_millis(5),
                delivered_after: Duration::from_millis(10),
            },
        );

        let order_id = Uuid::new_v4();
        let event = serde_json::json!({"eventType": "order.created", "orderId": order_id.to_string()});
        simulator.handle(event).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ignores_non_order_created_events() {
        let bus: Arc<InProcessBus> = Arc::new(InProcessBus::new());
        let count = StdArc::new(AtomicUsize::new(0));
        bus.subscribe(
            topics::DELIVERY_EVENTS,
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        );

        let simulator = DeliverySimulator::new(
            bus.clone() as Arc<dyn EventBus>,
            DeliverySimulatorConfig::default(),
        );

        simulator
            .handle(serde_json::json!({"eventType": "order.shipped"}))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

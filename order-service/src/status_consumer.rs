//! Apply inbound delivery-status events to their orders, exactly once.
//!
//! Subscribes to `delivery-events` and maps each `order.shipped`/
//! `order.delivered` event onto [`OrderService::update_order_status`].
//! Delivery is at-least-once per the bus's own contract; exactly-once
//! *application* comes from the processed-event marker the store checks
//! inside its own transaction, not from anything in this handler.

use async_trait::async_trait;
use event_bus::EventHandler;
use order_domain::{DeliveryStatusEvent, OrderError, OrderStatus};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::order_service::OrderService;

pub struct StatusConsumer {
    service: Arc<OrderService>,
}

impl StatusConsumer {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }

    fn status_for(event_type: &str) -> Option<OrderStatus> {
        match event_type {
            t if t == DeliveryStatusEvent::SHIPPED => Some(OrderStatus::Shipped),
            t if t == DeliveryStatusEvent::DELIVERED => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

#[async_trait]
impl EventHandler for StatusConsumer {
    async fn handle(&self, event: serde_json::Value) -> anyhow::Result<()> {
        let event_type = event
            .get("eventType")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let Some(new_status) = Self::status_for(event_type) else {
            debug!(event_type, "ignoring delivery event of unrecognized type");
            return Ok(());
        };

        let order_id = event
            .get("orderId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        let Some(order_id) = order_id else {
            warn!(event_type, "delivery event missing a valid orderId, dropping");
            return Ok(());
        };

        let event_id = event
            .get("eventId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        match self
            .service
            .update_order_status(order_id, new_status, event_id, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(OrderError::DuplicateEvent)
            | Err(OrderError::OrderNotFound)
            | Err(OrderError::InvalidStatusTransition) => {
                // Non-fatal from the bus's point of view: the marker/order
                // row state, not the handler, is authoritative here.
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_event_types_to_statuses() {
        assert_eq!(
            StatusConsumer::status_for(DeliveryStatusEvent::SHIPPED),
            Some(OrderStatus::Shipped)
        );
        assert_eq!(
            StatusConsumer::status_for(DeliveryStatusEvent::DELIVERED),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(StatusConsumer::status_for("order.cancelled"), None);
    }
}

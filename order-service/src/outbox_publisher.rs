//! The domain-specific [`EventRouter`] the generic
//! [`transactional_outbox::OutboxProcessor`] needs to know which topic a
//! leased row belongs on and how to shape its dead-letter payload.

use order_domain::DlqEvent;
use transactional_outbox::{EventRouter, OutboxEvent};
use uuid::Uuid;

pub struct OrderEventRouter;

impl EventRouter for OrderEventRouter {
    /// `order.created` -> `order-events`; the two delivery-side statuses a
    /// real delivery collaborator would emit -> `delivery-events`; anything
    /// else is a routing bug upstream, not a reason to drop the row.
    fn topic_for(&self, event_type: &str) -> String {
        match event_type {
            "order.created" => event_bus::topics::ORDER_EVENTS.to_string(),
            "order.shipped" | "order.delivered" => event_bus::topics::DELIVERY_EVENTS.to_string(),
            _ => event_bus::topics::UNKNOWN_EVENTS.to_string(),
        }
    }

    fn build_dlq_payload(&self, event: &OutboxEvent, reason: &str) -> serde_json::Value {
        let dlq = DlqEvent {
            event_id: Uuid::new_v4(),
            event_type: DlqEvent::EVENT_TYPE.to_string(),
            timestamp: chrono::Utc::now(),
            original_event: serde_json::json!({
                "id": event.id,
                "eventType": event.event_type,
                "aggregateId": event.aggregate_id,
                "payload": event.payload,
                "retryCount": event.retry_count,
            }),
            reason: reason.to_string(),
        };

        serde_json::to_value(&dlq).unwrap_or_else(|_| serde_json::json!({"reason": reason}))
    }

    fn dlq_topic(&self) -> &str {
        event_bus::topics::DEAD_LETTER_QUEUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event(event_type: &str) -> OutboxEvent {
        OutboxEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            aggregate_id: Uuid::new_v4(),
            payload: serde_json::json!({"eventId": Uuid::new_v4().to_string()}),
            published: false,
            retry_count: 5,
            next_retry_at: None,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn routes_order_created_to_order_events() {
        let router = OrderEventRouter;
        assert_eq!(router.topic_for("order.created"), "order-events");
    }

    #[test]
    fn routes_delivery_statuses_to_delivery_events() {
        let router = OrderEventRouter;
        assert_eq!(router.topic_for("order.shipped"), "delivery-events");
        assert_eq!(router.topic_for("order.delivered"), "delivery-events");
    }

    #[test]
    fn routes_unknown_event_types_to_unknown_events() {
        let router = OrderEventRouter;
        assert_eq!(router.topic_for("order.cancelled"), "unknown-events");
    }

    #[test]
    fn dlq_payload_carries_reason_and_original_event() {
        let router = OrderEventRouter;
        let event = sample_event("order.created");
        let payload = router.build_dlq_payload(&event, "Max retries exceeded");

        assert_eq!(payload["reason"], "Max retries exceeded");
        assert_eq!(payload["originalEvent"]["id"], event.id.to_string());
        assert_eq!(router.dlq_topic(), "dead-letter-queue");
    }
}

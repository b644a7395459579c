//! Accept orders (idempotent, inventory-gated, atomically persisted)
//! and apply inbound status updates idempotently.

use chrono::Utc;
use order_domain::{
    compute_total_amount, CreateOrderRequest, InsufficientItemDetail, InventoryCheckItem, Order,
    OrderCreatedEvent, OrderError, OrderStatus, OrderView,
};
use std::sync::Arc;
use tracing::{info, warn};
use transactional_outbox::OutboxEvent;
use uuid::Uuid;

use crate::inventory_client::InventoryClient;
use crate::store::Store;

pub struct OrderService {
    store: Store,
    inventory: Arc<InventoryClient>,
}

impl OrderService {
    pub fn new(store: Store, inventory: Arc<InventoryClient>) -> Self {
        Self { store, inventory }
    }

    /// Accepts a new order request, replaying the existing order when the
    /// given idempotency key was already used, otherwise gating on
    /// inventory availability before persisting the order and its
    /// `order.created` outbox row atomically.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        idempotency_key: Option<String>,
        correlation_id: Option<String>,
    ) -> Result<OrderView, OrderError> {
        if let Some(key) = &idempotency_key {
            if let Some(existing) = self
                .store
                .find_order_by_idempotency_key(key)
                .await
                .map_err(|e| e.to_domain())?
            {
                info!(
                    order_id = %existing.id,
                    idempotency_key = %key,
                    correlation_id = correlation_id.as_deref().unwrap_or(""),
                    "idempotent replay, returning existing order"
                );
                return Ok(existing.into());
            }
        }

        let check_items: Vec<InventoryCheckItem> = request
            .items
            .iter()
            .map(|item| InventoryCheckItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            })
            .collect();

        let availability = self.inventory.check_batch_availability(&check_items).await?;

        let insufficient: Vec<InsufficientItemDetail> = request
            .items
            .iter()
            .zip(availability.iter())
            .filter(|(_, avail)| !avail.available)
            .map(|(item, avail)| InsufficientItemDetail {
                product_id: item.product_id.clone(),
                requested: item.quantity,
                available: avail.available_quantity,
            })
            .collect();

        if !insufficient.is_empty() {
            warn!(
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                item_count = insufficient.len(),
                "order rejected for insufficient inventory"
            );
            return Err(OrderError::InsufficientInventory {
                details: insufficient,
            });
        }

        let total_amount = compute_total_amount(&request.items);
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = Order {
            id: order_id,
            customer_id: request.customer_id.clone(),
            items: request.items.clone(),
            total_amount,
            status: OrderStatus::PendingShipment,
            idempotency_key,
            created_at: now,
            updated_at: now,
        };

        let event_id = Uuid::new_v4();
        let created_event = OrderCreatedEvent {
            event_id,
            event_type: OrderCreatedEvent::EVENT_TYPE.to_string(),
            timestamp: now,
            order_id,
            customer_id: order.customer_id.clone(),
            items: order.items.clone(),
            total_amount: total_amount.to_string(),
            status: order.status.label().to_string(),
            created_at: now,
        };

        let payload = serde_json::to_value(&created_event).map_err(|e| {
            OrderError::ValidationError(format!("failed to serialize order.created event: {e}"))
        })?;

        let outbox_event = OutboxEvent {
            id: Uuid::new_v4(),
            event_type: OrderCreatedEvent::EVENT_TYPE.to_string(),
            aggregate_id: order_id,
            payload,
            published: false,
            retry_count: 0,
            next_retry_at: None,
            created_at: now,
            published_at: None,
        };

        let persisted = self
            .store
            .create_order_with_outbox(&order, &outbox_event)
            .await
            .map_err(|e| e.to_domain())?;

        info!(
            order_id = %persisted.id,
            correlation_id = correlation_id.as_deref().unwrap_or(""),
            total_amount = %persisted.total_amount,
            "order accepted"
        );

        Ok(persisted.into())
    }

    /// Applies a status transition driven by an inbound delivery event.
    /// Executes entirely inside the store's transactional method;
    /// this is a thin pass-through so callers depend on `OrderService`
    /// rather than `Store` directly.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        event_id: Uuid,
        correlation_id: Option<String>,
    ) -> Result<Order, OrderError> {
        let derived_event_type = new_status.derived_event_type();

        let result = self
            .store
            .update_status_and_mark_processed(order_id, new_status, event_id, &derived_event_type)
            .await;

        match &result {
            Ok(order) => info!(
                order_id = %order.id,
                new_status = %new_status,
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                "order status updated"
            ),
            Err(e) => warn!(
                order_id = %order_id,
                event_id = %event_id,
                correlation_id = correlation_id.as_deref().unwrap_or(""),
                error = %e,
                "order status update rejected"
            ),
        }

        result.map_err(|e| e.to_domain())
    }
}

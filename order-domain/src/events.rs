use crate::order::OrderItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published on `order-events` when an order is accepted. `total_amount` is
/// carried as a string so the exact decimal representation survives the
/// bus unchanged, to keep the money representation exact end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    #[serde(rename = "totalAmount")]
    pub total_amount: String,
    pub status: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedEvent {
    pub const EVENT_TYPE: &'static str = "order.created";
}

/// Published on `delivery-events` by the (out-of-core) simulated delivery
/// collaborator, and consumed by the status consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatusEvent {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
}

impl DeliveryStatusEvent {
    pub const SHIPPED: &'static str = "order.shipped";
    pub const DELIVERED: &'static str = "order.delivered";
}

/// Published on `dead-letter-queue` when an outbox row exhausts its retry
/// budget. `original_event` is the opaque outbox row snapshot, not
/// reinterpreted by the bus or its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEvent {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "originalEvent")]
    pub original_event: serde_json::Value,
    pub reason: String,
}

impl DlqEvent {
    pub const EVENT_TYPE: &'static str = "dlq.event";
}

/// One line of an inventory availability request, preserving the caller's
/// item order (the inventory collaborator's batch availability check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCheckItem {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub quantity: i32,
}

/// One line of an inventory availability response. `available=false` when
/// the collaborator cannot fill `quantity` from `available_quantity`, even
/// if the collaborator itself reports `available: true` for a smaller
/// amount — the inventory client is responsible for reconciling the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAvailability {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub available: bool,
    #[serde(rename = "availableQuantity")]
    pub available_quantity: i32,
}

/// Per-item shortfall detail attached to an `INSUFFICIENT_INVENTORY` error.
#[derive(Debug, Clone, Serialize)]
pub struct InsufficientItemDetail {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub requested: i32,
    pub available: i32,
}

use crate::status::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single requested line item. `unit_price` and `quantity` are carried as
/// exact, fixed-point values all the way through — no floating point enters
/// the computation of `total_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub quantity: i32,
    #[serde(rename = "price")]
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }
}

/// Sum of `quantity * unit_price` across `items`, rounded to the two-decimal
/// scale the persisted `total_amount` column uses. `rust_decimal` performs
/// this arithmetic without the representability loss `f64` would introduce.
pub fn compute_total_amount(items: &[OrderItem]) -> Decimal {
    let mut total = Decimal::ZERO;
    for item in items {
        total += item.line_total();
    }
    total.round_dp(2)
}

/// The persisted order aggregate. `total_amount` is fixed at insert time
/// and never recomputed; `status` is mutated only through the forward
/// transition table enforced by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The shape returned across the order service's public boundary (and, in
/// turn, the HTTP layer). `total_amount` is converted to `f64` only here —
/// everywhere internal to the core it stays a `Decimal`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    pub status: String,
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    #[serde(rename = "totalAmount")]
    pub total_amount: f64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        use rust_decimal::prelude::ToPrimitive;
        OrderView {
            order_id: order.id,
            status: order.status.label().to_string(),
            customer_id: order.customer_id,
            items: order.items,
            total_amount: order.total_amount.to_f64().unwrap_or_default(),
            created_at: order.created_at,
        }
    }
}

/// Request payload accepted by `OrderService::create_order`. Validation of
/// these constraints (non-empty `customer_id`, at least one item, positive
/// quantity, non-negative price) is declared out of scope for the core —
/// the order service treats a violation as a caller programming error.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "customerId")]
    pub customer_id: String,
    pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_amount_sums_exactly() {
        let items = vec![
            OrderItem {
                product_id: "p-1".into(),
                quantity: 2,
                unit_price: Decimal::new(1000, 2),
            },
            OrderItem {
                product_id: "p-2".into(),
                quantity: 1,
                unit_price: Decimal::new(1500, 2),
            },
        ];

        assert_eq!(compute_total_amount(&items), Decimal::new(3500, 2));
    }
}

//! End-to-end scenarios against a real Postgres instance. Skips (not
//! fails) when `DATABASE_URL` is unset.

mod support;

use async_trait::async_trait;
use order_domain::{CreateOrderRequest, InventoryAvailability, InventoryCheckItem, OrderError, OrderItem, OrderStatus};
use order_service::inventory_client::{InventoryClient, InventoryCollaborator};
use order_service::order_service::OrderService;
use order_service::store::Store;
use resilience::presets;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use support::TestEnvironment;
use uuid::Uuid;

struct AlwaysAvailable;

#[async_trait]
impl InventoryCollaborator for AlwaysAvailable {
    async fn check_batch_availability(
        &self,
        items: &[InventoryCheckItem],
    ) -> anyhow::Result<Vec<InventoryAvailability>> {
        Ok(items
            .iter()
            .map(|item| InventoryAvailability {
                product_id: item.product_id.clone(),
                available: true,
                available_quantity: item.quantity,
            })
            .collect())
    }
}

struct ShortOnP1;

#[async_trait]
impl InventoryCollaborator for ShortOnP1 {
    async fn check_batch_availability(
        &self,
        items: &[InventoryCheckItem],
    ) -> anyhow::Result<Vec<InventoryAvailability>> {
        Ok(items
            .iter()
            .map(|item| InventoryAvailability {
                product_id: item.product_id.clone(),
                available: item.product_id != "p-1",
                available_quantity: if item.product_id == "p-1" { 1 } else { item.quantity },
            })
            .collect())
    }
}

fn order_service_with(env: &TestEnvironment, collaborator: Arc<dyn InventoryCollaborator>) -> OrderService {
    let preset = presets::inventory_collaborator_config();
    let inventory = Arc::new(InventoryClient::new(collaborator, preset.circuit_breaker, preset.timeout));
    OrderService::new(Store::new(env.pool().clone()), inventory)
}

fn sample_request() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: "c-1".to_string(),
        items: vec![
            OrderItem {
                product_id: "p-1".to_string(),
                quantity: 2,
                unit_price: Decimal::new(1000, 2),
            },
            OrderItem {
                product_id: "p-2".to_string(),
                quantity: 1,
                unit_price: Decimal::new(1500, 2),
            },
        ],
    }
}

#[tokio::test]
async fn happy_path_accept_computes_total_and_writes_outbox_row() {
    let Some(env) = TestEnvironment::connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let service = order_service_with(&env, Arc::new(AlwaysAvailable));
    let key = Uuid::new_v4().to_string();

    let view = service
        .create_order(sample_request(), Some(key), None)
        .await
        .expect("order should be accepted");

    assert_eq!(view.status, "Pending Shipment");
    assert_eq!(view.total_amount, 35.00);

    let outbox_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1 AND event_type = 'order.created'",
    )
    .bind(view.order_id)
    .fetch_one(env.pool())
    .await
    .unwrap();
    assert_eq!(outbox_count, 1);

    env.cleanup_order(view.order_id).await;
}

#[tokio::test]
async fn idempotent_replay_returns_same_order_without_new_outbox_row() {
    let Some(env) = TestEnvironment::connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let service = order_service_with(&env, Arc::new(AlwaysAvailable));
    let key = Uuid::new_v4().to_string();

    let first = service
        .create_order(sample_request(), Some(key.clone()), None)
        .await
        .unwrap();
    let second = service
        .create_order(sample_request(), Some(key), None)
        .await
        .unwrap();

    assert_eq!(first.order_id, second.order_id);

    let outbox_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE aggregate_id = $1")
            .bind(first.order_id)
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(outbox_count, 1);

    env.cleanup_order(first.order_id).await;
}

#[tokio::test]
async fn insufficient_inventory_rejects_without_persisting_anything() {
    let Some(env) = TestEnvironment::connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let service = order_service_with(&env, Arc::new(ShortOnP1));
    let request = CreateOrderRequest {
        customer_id: "c-1".to_string(),
        items: vec![OrderItem {
            product_id: "p-1".to_string(),
            quantity: 5,
            unit_price: Decimal::new(1000, 2),
        }],
    };

    let err = service
        .create_order(request, Some(Uuid::new_v4().to_string()), None)
        .await
        .unwrap_err();

    match err {
        OrderError::InsufficientInventory { details } => {
            assert_eq!(details.len(), 1);
            assert_eq!(details[0].product_id, "p-1");
            assert_eq!(details[0].requested, 5);
            assert_eq!(details[0].available, 1);
        }
        other => panic!("expected INSUFFICIENT_INVENTORY, got {other:?}"),
    }
}

#[tokio::test]
async fn status_forward_and_duplicate_event_rules() {
    let Some(env) = TestEnvironment::connect().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let service = order_service_with(&env, Arc::new(AlwaysAvailable));
    let created = service
        .create_order(sample_request(), Some(Uuid::new_v4().to_string()), None)
        .await
        .unwrap();

    let shipped_event_id = Uuid::new_v4();
    let shipped = service
        .update_order_status(created.order_id, OrderStatus::Shipped, shipped_event_id, None)
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::from_str("Shipped").unwrap());

    let duplicate = service
        .update_order_status(created.order_id, OrderStatus::Shipped, shipped_event_id, None)
        .await
        .unwrap_err();
    assert!(matches!(duplicate, OrderError::DuplicateEvent));

    let delivered = service
        .update_order_status(created.order_id, OrderStatus::Delivered, Uuid::new_v4(), None)
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::from_str("Delivered").unwrap());

    let marker_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM processed_events WHERE event_id = ANY($1)")
            .bind(vec![shipped_event_id])
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(marker_count, 1);

    env.cleanup_order(created.order_id).await;
}

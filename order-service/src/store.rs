//! Transactional persistence of orders, outbox rows, and processed-event
//! markers. Nothing above the store is allowed to touch these tables
//! directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_domain::{Order, OrderError, OrderStatus};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use std::time::Duration;
use transactional_outbox::{OutboxEvent, OutboxRepository, OutboxResult};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let items_json: serde_json::Value = row.try_get("items")?;
    let items = serde_json::from_value(items_json)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Order {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        items,
        total_amount: row.try_get("total_amount")?,
        status: OrderStatus::from_str(&status_str)
            .map_err(|e| sqlx::Error::Decode(Box::new(std::io::Error::other(e))))?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `findOrderByIdempotencyKey`.
    pub async fn find_order_by_idempotency_key(
        &self,
        key: &str,
    ) -> ServiceResult<Option<Order>> {
        let row = sqlx::query(
            r#"SELECT id, customer_id, items, total_amount, status, idempotency_key, created_at, updated_at
               FROM orders WHERE idempotency_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose().map_err(ServiceError::from)
    }

    /// `findOrderById`.
    pub async fn find_order_by_id(&self, id: Uuid) -> ServiceResult<Option<Order>> {
        let row = sqlx::query(
            r#"SELECT id, customer_id, items, total_amount, status, idempotency_key, created_at, updated_at
               FROM orders WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose().map_err(ServiceError::from)
    }

    /// `createOrderWithOutbox`: a single transaction inserts both the
    /// order row and its `order.created` outbox row; either both commit or
    /// neither does.
    pub async fn create_order_with_outbox(
        &self,
        order: &Order,
        outbox_event: &OutboxEvent,
    ) -> ServiceResult<Order> {
        let mut tx = self.pool.begin().await?;

        let items_json = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, items, total_amount, status,
                idempotency_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(&order.customer_id)
        .bind(&items_json)
        .bind(order.total_amount)
        .bind(order.status.label())
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        let outbox_repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        outbox_repo.insert(&mut tx, outbox_event).await?;

        tx.commit().await?;

        Ok(order.clone())
    }

    /// `updateStatusAndMarkProcessed`. Inside one transaction:
    /// reject a replayed `event_id`, reject an unknown order, reject an
    /// illegal transition, then apply the status change and record the
    /// marker atomically.
    pub async fn update_status_and_mark_processed(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        event_id: Uuid,
        derived_event_type: &str,
    ) -> ServiceResult<Order> {
        let mut tx = self.pool.begin().await?;

        let already_processed: bool = sqlx::query(
            r#"SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1) AS exists_flag"#,
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("exists_flag")?;

        if already_processed {
            tx.rollback().await?;
            return Err(ServiceError::Domain(OrderError::DuplicateEvent));
        }

        let row = sqlx::query(
            r#"SELECT id, customer_id, items, total_amount, status, idempotency_key, created_at, updated_at
               FROM orders WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(ServiceError::Domain(OrderError::OrderNotFound));
        };

        let order = row_to_order(&row)?;

        if !order.status.can_transition_to(new_status) {
            tx.rollback().await?;
            return Err(ServiceError::Domain(OrderError::InvalidStatusTransition));
        }

        let now = Utc::now();

        sqlx::query(r#"UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1"#)
            .bind(id)
            .bind(new_status.label())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(derived_event_type)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Order {
            status: new_status,
            updated_at: now,
            ..order
        })
    }
}

/// Realizes [`OutboxRepository`] against the same pool the order/status
/// tables live in, so [`Store::create_order_with_outbox`] can co-commit an
/// outbox row and the generic publisher can still lease/mark it
/// through the shared trait.
#[async_trait]
impl OutboxRepository for Store {
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id, event_type, aggregate_id, payload, published,
                retry_count, next_retry_at, created_at, published_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(event.aggregate_id)
        .bind(&event.payload)
        .bind(event.published)
        .bind(event.retry_count)
        .bind(event.next_retry_at)
        .bind(event.created_at)
        .bind(event.published_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// `leaseOutboxBatch`: single CTE statement, `FOR UPDATE SKIP LOCKED`
    /// immediately followed by the lease-watermark update.
    async fn lease_batch(
        &self,
        limit: i64,
        now: DateTime<Utc>,
        max_retries: i32,
        lease_duration: Duration,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        repo.lease_batch(limit, now, max_retries, lease_duration).await
    }

    async fn mark_published(
        &self,
        id: Uuid,
        event_id: Uuid,
        event_type: &str,
        published_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        repo.mark_published(id, event_id, event_type, published_at).await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        new_retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        repo.schedule_retry(id, new_retry_count, next_retry_at).await
    }

    async fn mark_dlq(&self, id: Uuid, published_at: DateTime<Utc>) -> OutboxResult<()> {
        let repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        repo.mark_dlq(id, published_at).await
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let repo = transactional_outbox::SqlxOutboxRepository::new(self.pool.clone());
        repo.pending_stats().await
    }
}

//! # Transactional Outbox Pattern Implementation
//!
//! Guarantees that a business write and the domain event it produces commit
//! atomically: the event row is inserted in the same database transaction as
//! the aggregate it describes, and a background [`OutboxProcessor`] drains
//! it onto an [`EventBus`] topic afterward.
//!
//! This used to ride on Kafka (`enable.idempotence`, partition keys, the
//! works). The service this library now backs has no external broker — the
//! in-process [`event_bus::EventBus`] is the only publish target — so the
//! publisher side has been collapsed to talk to that trait directly instead
//! of carrying a Kafka producer nobody instantiates.
//!
//! ## Lease semantics
//!
//! [`OutboxRepository::lease_batch`] must be implemented as a single
//! statement that selects candidate rows with `FOR UPDATE SKIP LOCKED` and
//! immediately stamps a `leased_until` watermark on them, so the lease does
//! not require holding a live transaction (and therefore a live Postgres
//! lock) across the subsequent bus publish — see [`SqlxOutboxRepository`]
//! for the reference query. A second worker polling concurrently skips rows
//! already locked by the first, and skips rows whose `leased_until` is still
//! in the future even after the original lock is released.
//!
//! ## Retry schedule
//!
//! A failed publish schedules a retry with delay
//! `min(max_delay, base_delay * 2^(retry_count - 1))`. Once `retry_count`
//! reaches `max_retries`, the row is routed to the dead-letter topic instead
//! of being retried again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::EventBus;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

mod error;
pub mod metrics;

pub use error::{OutboxError, OutboxResult};

/// A row in the `outbox_events` table: a domain event awaiting delivery to
/// the bus, plus the `leased_until` lease watermark (an implementation
/// detail not part of the logical schema — see the module docs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub published: bool,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Repository trait for managing outbox rows. Abstracts the database so the
/// processor can be exercised against a fake in tests.
///
/// Implementations own whatever cross-table bookkeeping the host service
/// requires alongside the outbox row itself (e.g. inserting a
/// processed-event marker in the same transaction as `mark_published`) —
/// this trait only names the outbox-row-shaped half of that contract.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new event into the outbox within a transaction the caller
    /// already opened alongside the aggregate write it describes.
    async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()>;

    /// Lease up to `limit` eligible rows: `published = false`,
    /// `retry_count <= max_retries`, and `next_retry_at` unset or due.
    /// Must use skip-locked selection so concurrent workers partition the
    /// backlog without blocking each other.
    async fn lease_batch(
        &self,
        limit: i64,
        now: DateTime<Utc>,
        max_retries: i32,
        lease_duration: Duration,
    ) -> OutboxResult<Vec<OutboxEvent>>;

    /// Record a successful publish. `event_id`/`event_type` are the
    /// payload-level identifiers (not the outbox row id) so the caller can
    /// co-insert a processed-event marker keyed the way downstream
    /// consumers dedupe.
    async fn mark_published(
        &self,
        id: Uuid,
        event_id: Uuid,
        event_type: &str,
        published_at: DateTime<Utc>,
    ) -> OutboxResult<()>;

    /// Schedule the next retry attempt after a failed publish.
    async fn schedule_retry(
        &self,
        id: Uuid,
        new_retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> OutboxResult<()>;

    /// Abandon a row to the dead-letter queue. No processed-event marker is
    /// inserted — the row is being given up on, not successfully delivered.
    async fn mark_dlq(&self, id: Uuid, published_at: DateTime<Utc>) -> OutboxResult<()>;

    /// Pending count and oldest-pending age in seconds (0 if none pending).
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

/// SQLx/PostgreSQL realization of [`OutboxRepository`] against an
/// `outbox_events` table shaped per the schema this crate expects, plus the
/// `leased_until` lease column.
pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<OutboxEvent, sqlx::Error> {
    Ok(OutboxEvent {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        payload: row.try_get("payload")?,
        published: row.try_get("published")?,
        retry_count: row.try_get("retry_count")?,
        next_retry_at: row.try_get("next_retry_at")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
    })
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
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

    async fn lease_batch(
        &self,
        limit: i64,
        now: DateTime<Utc>,
        max_retries: i32,
        lease_duration: Duration,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let lease_seconds = lease_duration.as_secs() as f64;

        let rows = sqlx::query(
            r#"
            WITH candidates AS (
                SELECT id
                FROM outbox_events
                WHERE published = false
                  AND retry_count <= $3
                  AND (next_retry_at IS NULL OR next_retry_at <= $1)
                  AND (leased_until IS NULL OR leased_until <= $1)
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_events o
            SET leased_until = $1 + make_interval(secs => $4)
            FROM candidates c
            WHERE o.id = c.id
            RETURNING
                o.id, o.event_type, o.aggregate_id, o.payload, o.published,
                o.retry_count, o.next_retry_at, o.created_at, o.published_at
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(max_retries)
        .bind(lease_seconds)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(row_to_event)
            .collect::<Result<Vec<_>, _>>()
            .map_err(OutboxError::from)
    }

    async fn mark_published(
        &self,
        id: Uuid,
        event_id: Uuid,
        event_type: &str,
        published_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published = true, published_at = $2, leased_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(published_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(id));
        }

        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(published_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        new_retry_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = $2, next_retry_at = $3, leased_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_retry_count)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(id));
        }

        Ok(())
    }

    async fn mark_dlq(&self, id: Uuid, published_at: DateTime<Utc>) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET published = true, published_at = $2, leased_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(published_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::EventNotFound(id));
        }

        Ok(())
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_events
            WHERE published = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = rec.try_get("pending")?;
        let age: i64 = rec.try_get("age_seconds")?;
        Ok((pending, age))
    }
}

/// Tunables for [`OutboxProcessor`].
#[derive(Debug, Clone)]
pub struct OutboxProcessorConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub lease_duration: Duration,
}

impl Default for OutboxProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 50,
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1600),
            lease_duration: Duration::from_secs(30),
        }
    }
}

/// How a leased row's `event_type` maps onto a bus topic, and how a
/// dead-lettered row is translated into the DLQ event payload. Left to the
/// caller because both are entirely domain-specific.
pub trait EventRouter: Send + Sync {
    fn topic_for(&self, event_type: &str) -> String;

    /// Build the payload published to the dead-letter topic for `event`
    /// abandoned for `reason`.
    fn build_dlq_payload(&self, event: &OutboxEvent, reason: &str) -> serde_json::Value;

    fn dlq_topic(&self) -> &str;
}

/// Background processor draining the outbox onto an [`EventBus`].
///
/// # Concurrency
///
/// Multiple processors (or poll ticks) may run over the same repository
/// without coordination: `lease_batch`'s skip-locked selection ensures each
/// row is held by at most one worker at a time, and a row a worker fails to
/// finish is released (via `schedule_retry`/`mark_dlq`) for the next cycle
/// to pick up.
pub struct OutboxProcessor<R: OutboxRepository, B: EventBus, Router: EventRouter> {
    repository: Arc<R>,
    bus: Arc<B>,
    router: Arc<Router>,
    config: OutboxProcessorConfig,
    metrics: Option<metrics::OutboxMetrics>,
}

impl<R: OutboxRepository, B: EventBus, Router: EventRouter> OutboxProcessor<R, B, Router> {
    pub fn new(
        repository: Arc<R>,
        bus: Arc<B>,
        router: Arc<Router>,
        config: OutboxProcessorConfig,
    ) -> Self {
        Self {
            repository,
            bus,
            router,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: metrics::OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the poll loop until `shutdown` resolves. A single worker never
    /// runs two batches concurrently; overlapping ticks are not possible
    /// because each iteration awaits the previous batch's completion before
    /// sleeping for `poll_interval`.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retries = self.config.max_retries,
            "outbox processor starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbox processor shutting down");
                        return;
                    }
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&self) {
        match self.process_batch().await {
            Ok(0) => {}
            Ok(count) => info!(published_count = count, "outbox batch processed"),
            Err(e) => error!(error = %e, "outbox batch failed, retrying next tick"),
        }

        if let Some(metrics) = &self.metrics {
            if let Ok((pending, age)) = self.repository.pending_stats().await {
                metrics.pending.set(pending);
                metrics.oldest_pending_age_seconds.set(age);
            }
        }

        tokio::time::sleep(self.config.poll_interval).await;
    }

    /// Lease one batch and publish every row concurrently, never letting a
    /// single row's failure abort the others. Public so integration tests
    /// can drive the processor one batch at a time instead of racing
    /// `run`'s poll loop.
    pub async fn process_batch(&self) -> OutboxResult<usize> {
        let now = Utc::now();
        let rows = self
            .repository
            .lease_batch(
                self.config.batch_size,
                now,
                self.config.max_retries,
                self.config.lease_duration,
            )
            .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let results = futures::future::join_all(rows.into_iter().map(|row| self.publish_one(row)))
            .await;

        Ok(results.into_iter().filter(|ok| *ok).count())
    }

    /// Publish a single leased row, returning whether it ended up published
    /// (including by being dead-lettered).
    async fn publish_one(&self, row: OutboxEvent) -> bool {
        let topic = self.router.topic_for(&row.event_type);
        let now = Utc::now();

        match self.bus.publish(&topic, row.payload.clone()).await {
            Ok(()) => {
                let event_id = row
                    .payload
                    .get("eventId")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .unwrap_or(row.id);

                match self
                    .repository
                    .mark_published(row.id, event_id, &row.event_type, now)
                    .await
                {
                    Ok(()) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.published.inc();
                        }
                        true
                    }
                    Err(e) => {
                        // The bus already has this event; downstream
                        // consumers dedupe by payload eventId, so the next
                        // lease cycle re-publishing this row is tolerated.
                        error!(
                            outbox_id = %row.id,
                            error = %e,
                            "publish succeeded but mark_published failed, row remains unpublished"
                        );
                        false
                    }
                }
            }
            Err(e) => {
                warn!(outbox_id = %row.id, event_type = %row.event_type, error = %e, "publish failed");
                self.handle_publish_failure(row, now).await
            }
        }
    }

    async fn handle_publish_failure(&self, row: OutboxEvent, now: DateTime<Utc>) -> bool {
        let new_retry_count = row.retry_count + 1;

        if new_retry_count >= self.config.max_retries {
            let dlq_payload = self.router.build_dlq_payload(&row, "Max retries exceeded");
            match self.bus.publish(self.router.dlq_topic(), dlq_payload).await {
                Ok(()) => match self.repository.mark_dlq(row.id, now).await {
                    Ok(()) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.dead_lettered.inc();
                        }
                        warn!(outbox_id = %row.id, "event moved to dead-letter queue");
                        true
                    }
                    Err(e) => {
                        error!(outbox_id = %row.id, error = %e, "mark_dlq failed after DLQ publish succeeded");
                        false
                    }
                },
                Err(e) => {
                    // Defer the publish/mark swap:
                    // leave the row's retry fields untouched so the next
                    // lease cycle retries the DLQ publish rather than
                    // silently losing the event.
                    error!(outbox_id = %row.id, error = %e, "DLQ publish failed, row left pending for retry");
                    false
                }
            }
        } else {
            let delay_ms = (self.config.base_delay.as_millis() as u64)
                .saturating_mul(1u64 << (new_retry_count - 1))
                .min(self.config.max_delay.as_millis() as u64);
            let next_retry_at = now + chrono::Duration::milliseconds(delay_ms as i64);

            match self
                .repository
                .schedule_retry(row.id, new_retry_count, next_retry_at)
                .await
            {
                Ok(()) => false,
                Err(e) => {
                    error!(outbox_id = %row.id, error = %e, "schedule_retry failed");
                    false
                }
            }
        }
    }
}

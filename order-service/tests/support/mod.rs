//! Shared fixture for integration tests: a pool against a real Postgres
//! plus row-scoped cleanup. Every test module that needs a database checks
//! `DATABASE_URL` itself and skips (rather than failing) when it is unset,
//! so these tests run in CI without a database and exercise the real
//! schema wherever one is available.

use sqlx::PgPool;
use uuid::Uuid;

pub struct TestEnvironment {
    pool: PgPool,
}

impl TestEnvironment {
    pub async fn connect() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("run migrations against test database");
        Some(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn cleanup_order(&self, order_id: Uuid) {
        let _ = sqlx::query("DELETE FROM outbox_events WHERE aggregate_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await;
    }
}

//! Environment-driven configuration, one struct per external concern.
//!
//! Every numeric knob the service exposes as configuration gets a typed field here
//! with the listed default, overridable by an env var named the way
//! `db-pool::DbConfig` names its own (`SCREAMING_SNAKE`, prefixed by the
//! concern it belongs to).

use resilience::circuit_breaker::CircuitBreakerConfig;
use resilience::timeout::TimeoutConfig;
use std::time::Duration;

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `databaseUrl`, `dbPoolMax`, `dbPoolMin`, `idleTimeoutMs`, `connectionTimeoutMs`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max: u32,
    pub pool_min: u32,
    pub idle_timeout_ms: u64,
    pub connection_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, String> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;

        Ok(Self {
            url,
            pool_max: env_u32("DB_POOL_MAX", 50),
            pool_min: env_u32("DB_POOL_MIN", 10),
            idle_timeout_ms: env_u64("DB_IDLE_TIMEOUT_MS", 30_000),
            connection_timeout_ms: env_u64("DB_CONNECTION_TIMEOUT_MS", 10_000),
        })
    }

    /// Translate into the shape `db_pool::create_pool` consumes.
    pub fn to_pool_config(&self, service_name: &str) -> db_pool::DbConfig {
        db_pool::DbConfig {
            service_name: service_name.to_string(),
            database_url: self.url.clone(),
            max_connections: self.pool_max,
            min_connections: self.pool_min,
            connect_timeout_secs: self.connection_timeout_ms / 1000,
            acquire_timeout_secs: self.connection_timeout_ms / 1000,
            idle_timeout_secs: self.idle_timeout_ms / 1000,
            max_lifetime_secs: 1800,
        }
    }
}

/// `circuitBreaker.{timeoutMs, failureThreshold, resetTimeoutMs}`.
#[derive(Debug, Clone)]
pub struct InventoryCircuitBreakerConfig {
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl InventoryCircuitBreakerConfig {
    pub fn from_env() -> Self {
        Self {
            timeout_ms: env_u64("CIRCUIT_BREAKER_TIMEOUT_MS", 5_000),
            failure_threshold: env_u32("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5),
            reset_timeout_ms: env_u64("CIRCUIT_BREAKER_RESET_TIMEOUT_MS", 30_000),
        }
    }

    /// Built on top of [`resilience::presets::inventory_collaborator_config`],
    /// overriding only the fields this service exposes as configuration. The
    /// breaker's `timeout` field is the Open→HalfOpen reset wait, not the
    /// per-call timeout — that one lives in [`Self::to_timeout_config`].
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        let mut cfg = resilience::presets::inventory_collaborator_config().circuit_breaker;
        cfg.failure_threshold = self.failure_threshold;
        cfg.timeout = Duration::from_millis(self.reset_timeout_ms);
        cfg
    }

    /// Per-call timeout the circuit breaker races the inventory RPC against.
    pub fn to_timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig {
            duration: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// `outbox.{pollIntervalMs, batchSize, maxRetries, baseDelayMs, maxDelayMs}`.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    pub max_retries: i32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env_u64("OUTBOX_POLL_INTERVAL_MS", 1_000),
            batch_size: env_i32("OUTBOX_BATCH_SIZE", 50) as i64,
            max_retries: env_i32("OUTBOX_MAX_RETRIES", 5),
            base_delay_ms: env_u64("OUTBOX_BASE_DELAY_MS", 100),
            max_delay_ms: env_u64("OUTBOX_MAX_DELAY_MS", 1_600),
        }
    }

    pub fn to_processor_config(&self) -> transactional_outbox::OutboxProcessorConfig {
        transactional_outbox::OutboxProcessorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            lease_duration: Duration::from_secs(30),
        }
    }
}

/// `inventory.failureRatePercent` — test hook consumed only by the mock
/// inventory collaborator, never by the reliability core itself.
#[derive(Debug, Clone)]
pub struct InventoryMockConfig {
    pub failure_rate_percent: u32,
}

impl InventoryMockConfig {
    pub fn from_env() -> Self {
        Self {
            failure_rate_percent: env_u32("INVENTORY_FAILURE_RATE_PERCENT", 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            http_port: std::env::var("HTTP_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub circuit_breaker: InventoryCircuitBreakerConfig,
    pub outbox: OutboxConfig,
    pub inventory_mock: InventoryMockConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        Ok(Self {
            app: AppConfig::from_env(),
            database: DatabaseConfig::from_env()?,
            circuit_breaker: InventoryCircuitBreakerConfig::from_env(),
            outbox: OutboxConfig::from_env(),
            inventory_mock: InventoryMockConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn database_config_defaults_match_spec() {
        std::env::remove_var("DB_POOL_MAX");
        std::env::remove_var("DB_POOL_MIN");
        std::env::remove_var("DB_IDLE_TIMEOUT_MS");
        std::env::remove_var("DB_CONNECTION_TIMEOUT_MS");
        std::env::set_var("DATABASE_URL", "postgres://localhost/order_service_test");

        let cfg = DatabaseConfig::from_env().unwrap();
        assert_eq!(cfg.pool_max, 50);
        assert_eq!(cfg.pool_min, 10);
        assert_eq!(cfg.idle_timeout_ms, 30_000);
        assert_eq!(cfg.connection_timeout_ms, 10_000);

        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn outbox_config_defaults_match_spec() {
        std::env::remove_var("OUTBOX_POLL_INTERVAL_MS");
        std::env::remove_var("OUTBOX_BATCH_SIZE");
        std::env::remove_var("OUTBOX_MAX_RETRIES");
        std::env::remove_var("OUTBOX_BASE_DELAY_MS");
        std::env::remove_var("OUTBOX_MAX_DELAY_MS");

        let cfg = OutboxConfig::from_env();
        assert_eq!(cfg.poll_interval_ms, 1_000);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.base_delay_ms, 100);
        assert_eq!(cfg.max_delay_ms, 1_600);
    }

    #[test]
    #[serial]
    fn circuit_breaker_config_defaults_match_spec() {
        std::env::remove_var("CIRCUIT_BREAKER_TIMEOUT_MS");
        std::env::remove_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD");
        std::env::remove_var("CIRCUIT_BREAKER_RESET_TIMEOUT_MS");

        let cfg = InventoryCircuitBreakerConfig::from_env();
        assert_eq!(cfg.timeout_ms, 5_000);
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.reset_timeout_ms, 30_000);
    }
}

//! Batch availability check against the external inventory collaborator,
//! guarded by a circuit breaker and per-call timeout. The collaborator
//! itself is out of scope — only the RPC
//! shape it must satisfy is specified — so this module depends on a small
//! trait and ships one stand-in realization (`SimulatedInventoryCollaborator`)
//! kept out of the reliability core proper.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use order_domain::{InventoryAvailability, InventoryCheckItem, OrderError};
use prometheus::{IntGauge, Opts};
use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use resilience::timeout::{with_timeout_result, TimeoutConfig};
use std::sync::Arc;
use tracing::warn;

/// Current circuit state against the inventory collaborator, sampled after
/// every call: `0 = Closed`, `1 = HalfOpen`, `2 = Open`.
#[derive(Clone)]
struct CircuitGauge(IntGauge);

impl CircuitGauge {
    fn new(service: &str) -> Self {
        let gauge = IntGauge::with_opts(
            Opts::new(
                "inventory_circuit_breaker_state",
                "Circuit breaker state against the inventory collaborator (0=closed, 1=half-open, 2=open)",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for inventory_circuit_breaker_state");

        if let Err(e) = prometheus::default_registry().register(Box::new(gauge.clone())) {
            warn!("Failed to register inventory circuit breaker gauge: {}", e);
        }

        Self(gauge)
    }

    fn set(&self, state: CircuitState) {
        self.0.set(match state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        });
    }
}

/// The RPC shape the external inventory collaborator must satisfy.
/// Implementations may fail for any reason; every failure surfaces as
/// `InventoryUnavailable` to the caller regardless of cause.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InventoryCollaborator: Send + Sync {
    async fn check_batch_availability(
        &self,
        items: &[InventoryCheckItem],
    ) -> anyhow::Result<Vec<InventoryAvailability>>;
}

/// Wraps an [`InventoryCollaborator`] behind a circuit breaker
/// and a per-call timeout, preserving the caller's item order.
pub struct InventoryClient {
    collaborator: Arc<dyn InventoryCollaborator>,
    breaker: CircuitBreaker,
    timeout: TimeoutConfig,
    gauge: Option<CircuitGauge>,
}

impl InventoryClient {
    pub fn new(
        collaborator: Arc<dyn InventoryCollaborator>,
        breaker_config: CircuitBreakerConfig,
        timeout: TimeoutConfig,
    ) -> Self {
        Self {
            collaborator,
            breaker: CircuitBreaker::new(breaker_config),
            timeout,
            gauge: None,
        }
    }

    /// Registers and maintains the `inventory_circuit_breaker_state` gauge
    /// against the default Prometheus registry under `service`.
    pub fn with_metrics(mut self, service: &str) -> Self {
        self.gauge = Some(CircuitGauge::new(service));
        self
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// `checkBatchAvailability`. No retry at this level — the caller
    /// decides whether/how to react to `InventoryServiceUnavailable`.
    pub async fn check_batch_availability(
        &self,
        items: &[InventoryCheckItem],
    ) -> Result<Vec<InventoryAvailability>, OrderError> {
        let timeout = self.timeout.duration;
        let result = self
            .breaker
            .call(|| with_timeout_result(timeout, self.collaborator.check_batch_availability(items)))
            .await;

        if let Some(gauge) = &self.gauge {
            gauge.set(self.breaker.state());
        }

        result.map_err(|_| OrderError::InventoryServiceUnavailable)
    }
}

/// Out-of-core stand-in collaborator: fails a configurable fraction of
/// calls, and otherwise reports every requested line as fully available.
/// Never part of the reliability core under test — a real deployment swaps
/// this for an actual RPC client. Distinct from the `mockall`-generated
/// `MockInventoryCollaborator` used in this module's own unit tests.
pub struct SimulatedInventoryCollaborator {
    failure_rate_percent: u32,
}

impl SimulatedInventoryCollaborator {
    pub fn new(failure_rate_percent: u32) -> Self {
        Self {
            failure_rate_percent: failure_rate_percent.min(100),
        }
    }
}

#[async_trait]
impl InventoryCollaborator for SimulatedInventoryCollaborator {
    async fn check_batch_availability(
        &self,
        items: &[InventoryCheckItem],
    ) -> anyhow::Result<Vec<InventoryAvailability>> {
        if self.failure_rate_percent > 0 && rand::random::<u32>() % 100 < self.failure_rate_percent
        {
            anyhow::bail!("mock inventory collaborator simulated failure");
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::presets;

    #[tokio::test]
    async fn collaborator_failure_surfaces_as_inventory_unavailable() {
        let mut collaborator = MockInventoryCollaborator::new();
        collaborator
            .expect_check_batch_availability()
            .returning(|_| anyhow::bail!("boom"));

        let preset = presets::inventory_collaborator_config();
        let client = InventoryClient::new(Arc::new(collaborator), preset.circuit_breaker, preset.timeout);

        let items = vec![InventoryCheckItem {
            product_id: "p-1".into(),
            quantity: 1,
        }];

        let err = client.check_batch_availability(&items).await.unwrap_err();
        assert!(matches!(err, OrderError::InventoryServiceUnavailable));
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_consecutive_failures() {
        let mut collaborator = MockInventoryCollaborator::new();
        collaborator
            .expect_check_batch_availability()
            .returning(|_| anyhow::bail!("boom"));

        let mut cfg = presets::inventory_collaborator_config();
        cfg.circuit_breaker.failure_threshold = 2;
        let client = InventoryClient::new(Arc::new(collaborator), cfg.circuit_breaker, cfg.timeout);

        let items = vec![InventoryCheckItem {
            product_id: "p-1".into(),
            quantity: 1,
        }];

        for _ in 0..2 {
            let _ = client.check_batch_availability(&items).await;
        }

        assert_eq!(client.circuit_state(), resilience::circuit_breaker::CircuitState::Open);
    }

    #[tokio::test]
    async fn preserves_input_order_in_response() {
        let mut collaborator = MockInventoryCollaborator::new();
        collaborator
            .expect_check_batch_availability()
            .returning(|items| {
                Ok(items
                    .iter()
                    .map(|item| InventoryAvailability {
                        product_id: item.product_id.clone(),
                        available: item.quantity <= 1,
                        available_quantity: 1,
                    })
                    .collect())
            });

        let preset = presets::inventory_collaborator_config();
        let client = InventoryClient::new(Arc::new(collaborator), preset.circuit_breaker, preset.timeout);

        let items = vec![
            InventoryCheckItem {
                product_id: "p-1".into(),
                quantity: 5,
            },
            InventoryCheckItem {
                product_id: "p-2".into(),
                quantity: 1,
            },
        ];

        let result = client.check_batch_availability(&items).await.unwrap();
        assert_eq!(result[0].product_id, "p-1");
        assert!(!result[0].available);
        assert_eq!(result[1].product_id, "p-2");
        assert!(result[1].available);
    }
}

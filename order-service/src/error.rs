//! Service-level error type. `order_domain::OrderError` is the client-facing
//! business taxonomy; this wraps it with the infrastructure failures that
//! can occur on the way there (database, serialization) so the store and
//! service layers have one `Result` to propagate through `?`.

use order_domain::OrderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] OrderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("outbox error: {0}")]
    Outbox(#[from] transactional_outbox::OutboxError),
}

impl ServiceError {
    /// Collapse to the client-facing error taxonomy: any
    /// infrastructure fault is reported to the client as
    /// `INVENTORY_SERVICE_UNAVAILABLE`, the designated catch-all for
    /// systemic failures, while still being logged with full detail by the
    /// caller before this conversion.
    pub fn to_domain(&self) -> OrderError {
        match self {
            ServiceError::Domain(e) => match e {
                OrderError::InsufficientInventory { details } => OrderError::InsufficientInventory {
                    details: details.clone(),
                },
                OrderError::InventoryServiceUnavailable => OrderError::InventoryServiceUnavailable,
                OrderError::OrderNotFound => OrderError::OrderNotFound,
                OrderError::InvalidStatusTransition => OrderError::InvalidStatusTransition,
                OrderError::DuplicateEvent => OrderError::DuplicateEvent,
                OrderError::ValidationError(msg) => OrderError::ValidationError(msg.clone()),
            },
            ServiceError::Database(_) | ServiceError::Serialization(_) | ServiceError::Outbox(_) => {
                OrderError::InventoryServiceUnavailable
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

use crate::events::InsufficientItemDetail;
use thiserror::Error;

/// Domain-level error taxonomy shared by the order service, the store, and
/// the inventory client. Business errors flow as values — nothing in this
/// enum is meant to cross a component boundary as a panic or a generic
/// `anyhow::Error`.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("insufficient inventory for one or more items")]
    InsufficientInventory {
        details: Vec<InsufficientItemDetail>,
    },

    #[error("inventory service unavailable")]
    InventoryServiceUnavailable,

    #[error("order not found")]
    OrderNotFound,

    #[error("invalid status transition")]
    InvalidStatusTransition,

    #[error("event already processed")]
    DuplicateEvent,

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl OrderError {
    /// The stable, client-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            OrderError::InventoryServiceUnavailable => "INVENTORY_SERVICE_UNAVAILABLE",
            OrderError::OrderNotFound => "ORDER_NOT_FOUND",
            OrderError::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            OrderError::DuplicateEvent => "DUPLICATE_EVENT",
            OrderError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;

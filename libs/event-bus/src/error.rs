//! Error types for the in-process event bus.

use thiserror::Error;

/// Result type for event bus operations.
pub type BusResult<T> = Result<T, BusError>;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("no subscribers registered for topic '{0}'")]
    NoSubscribers(String),

    #[error("subscriber handler panicked while handling topic '{0}'")]
    HandlerPanicked(String),
}

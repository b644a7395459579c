//! In-process topic/subscriber event bus.
//!
//! Abstracts whatever external broker a production deployment would sit in
//! front of (Kafka, NATS, SQS, ...) behind a small trait so the outbox
//! publisher and the status consumer depend only on `EventBus`. The only
//! realization shipped here is [`InProcessBus`]: synchronous fan-out to
//! registered handlers, with each handler isolated from the others'
//! failures.
//!
//! Delivery guarantee: at-least-once to each subscriber that was
//! registered at publish time, per-topic FIFO from a single publisher.
//! The bus itself does not retry a failed handler call — at-least-once
//! for the system as a whole comes from the outbox publisher re-publishing
//! until its own downstream bookkeeping (`markPublished`) succeeds.

mod error;
mod inprocess;

pub use error::{BusError, BusResult};
pub use inprocess::InProcessBus;

use async_trait::async_trait;
use std::sync::Arc;

/// Well-known topic names used by the order lifecycle core.
pub mod topics {
    pub const ORDER_EVENTS: &str = "order-events";
    pub const DELIVERY_EVENTS: &str = "delivery-events";
    pub const DEAD_LETTER_QUEUE: &str = "dead-letter-queue";
    pub const UNKNOWN_EVENTS: &str = "unknown-events";
}

/// A handler registered against a topic. Implementations should be cheap to
/// clone (wrap heavier state in their own `Arc`) since the bus holds one
/// `Arc<dyn EventHandler>` per subscription.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: serde_json::Value) -> anyhow::Result<()>;
}

/// Publish/subscribe contract the outbox publisher and status consumer are
/// written against. See module docs for the delivery guarantee.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver `event` to every handler currently subscribed to `topic`.
    /// A handler error is logged and does not prevent delivery to the
    /// remaining subscribers, nor does it surface to the publisher.
    async fn publish(&self, topic: &str, event: serde_json::Value) -> BusResult<()>;

    /// Register `handler` against `topic`. Multiple handlers per topic are
    /// allowed; they are invoked in subscription order.
    fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>);
}

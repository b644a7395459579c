//! Shared value types for the order intake and lifecycle service: the
//! status enum, the order aggregate, event payload shapes exchanged on the
//! bus, and the client-facing error taxonomy.

mod error;
mod events;
mod order;
mod status;

pub use error::{OrderError, OrderResult};
pub use events::{
    DeliveryStatusEvent, DlqEvent, InsufficientItemDetail, InventoryAvailability,
    InventoryCheckItem, OrderCreatedEvent,
};
pub use order::{compute_total_amount, CreateOrderRequest, Order, OrderItem, OrderView};
pub use status::OrderStatus;

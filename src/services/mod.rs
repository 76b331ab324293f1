//! Pipeline services: order intake, settlement, reservation reaping.

mod intake;
mod reaper;
mod settlement;

pub use intake::{OrderIntake, PurchaseRequest};
pub use reaper::ReservationReaper;
pub use settlement::{Outcome, Settlement, SettlementWorker};

use crate::bus::ChannelError;
use crate::interfaces::StorageError;
use crate::orders::{EventId, OrderId, OrderStatus};

/// Result type for sales operations.
pub type Result<T> = std::result::Result<T, SalesError>;

/// Errors surfaced by the sales pipeline.
///
/// Business-rule failures (insufficient stock, illegal transitions) are
/// final and never retried automatically; store/broker failures are
/// transient and map to a retryable status at the API surface.
#[derive(Debug, thiserror::Error)]
pub enum SalesError {
    #[error("Insufficient inventory for event {event_id}, category {category} (requested {requested})")]
    InsufficientInventory {
        event_id: EventId,
        category: String,
        requested: u32,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown reference: {0}")]
    InvalidReference(String),

    #[error("Duplicate order: {0}")]
    DuplicateOrder(OrderId),

    #[error("Invalid state transition for order {order_id}: {from} -> {to}")]
    InvalidStateTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Broker error: {0}")]
    Broker(#[from] ChannelError),
}

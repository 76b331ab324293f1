//! Order intake: the producer side of the pipeline.
//!
//! `submit` performs the tentative atomic reservation, writes the ledger
//! record, and enqueues the purchase intent; the caller gets an order id
//! back immediately. Payment settlement happens later, on the worker.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::bus::IntentPublisher;
use crate::interfaces::{InventoryStore, SalesLedger, StorageError};
use crate::orders::{
    BuyerId, EventId, EventRecord, OrderId, OrderStatus, PurchaseIntent, TicketKind, TicketOrder,
};

use super::{Result, SalesError};

/// A validated purchase submission.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Event to buy tickets for.
    pub event_id: EventId,
    /// Purchasing buyer.
    pub buyer_id: BuyerId,
    /// Category name within the event.
    pub category: String,
    /// Number of tickets; must be positive.
    pub quantity: u32,
    /// Entitlement kind.
    pub kind: TicketKind,
}

impl PurchaseRequest {
    fn validate(&self) -> Result<()> {
        if self.event_id.as_str().is_empty() {
            return Err(SalesError::InvalidRequest("evento_id must not be empty".into()));
        }
        if self.buyer_id.as_str().is_empty() {
            return Err(SalesError::InvalidRequest("usuario_id must not be empty".into()));
        }
        if self.category.is_empty() {
            return Err(SalesError::InvalidRequest("categoria must not be empty".into()));
        }
        if self.quantity == 0 {
            return Err(SalesError::InvalidRequest("quantidade must be positive".into()));
        }
        Ok(())
    }
}

/// Request handler for purchases and the order lifecycle entry points.
///
/// Holds long-lived store and publisher handles, constructed once at
/// process start and shared by reference across request tasks.
pub struct OrderIntake {
    inventory: Arc<dyn InventoryStore>,
    ledger: Arc<dyn SalesLedger>,
    publisher: Arc<dyn IntentPublisher>,
}

impl OrderIntake {
    /// Wire the intake against its collaborators.
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        ledger: Arc<dyn SalesLedger>,
        publisher: Arc<dyn IntentPublisher>,
    ) -> Self {
        Self {
            inventory,
            ledger,
            publisher,
        }
    }

    /// Accept a purchase: reserve, record, enqueue.
    ///
    /// The reservation is the atomic conditional decrement on the
    /// inventory store; there is no separate availability read, so
    /// concurrent submissions for the last tickets cannot both succeed.
    ///
    /// # Errors
    ///
    /// `InsufficientInventory` when the reservation predicate fails
    /// (out of stock, inactive event, or unknown category); storage and
    /// broker errors propagate as transient failures.
    #[tracing::instrument(name = "intake.submit", skip_all, fields(event = %request.event_id, buyer = %request.buyer_id))]
    pub async fn submit(&self, request: PurchaseRequest) -> Result<OrderId> {
        request.validate()?;

        let order_id = OrderId::generate();

        let reserved = self
            .inventory
            .reserve(&request.event_id, &request.category, request.quantity)
            .await?;

        let Some(event) = reserved else {
            info!(
                event = %request.event_id,
                category = %request.category,
                quantity = request.quantity,
                "Reservation predicate failed"
            );
            return Err(SalesError::InsufficientInventory {
                event_id: request.event_id,
                category: request.category,
                requested: request.quantity,
            });
        };

        let full_price = event
            .category(&request.category)
            .map(|c| c.unit_price)
            .ok_or_else(|| {
                StorageError::MalformedDocument("category missing after reservation".into())
            })?;
        let unit_price = request.kind.unit_price(full_price);
        let total = f64::from(request.quantity) * unit_price;

        let order = TicketOrder {
            id: order_id.clone(),
            event_id: request.event_id.clone(),
            buyer_id: request.buyer_id.clone(),
            category: request.category.clone(),
            quantity: request.quantity,
            kind: request.kind,
            unit_price,
            total,
            status: OrderStatus::Reserved,
            created_at: Utc::now(),
            settled_at: None,
        };

        if let Err(e) = self.ledger.insert(&order).await {
            // Ledger write failed after the decrement: give the stock
            // back before surfacing the error.
            if let Err(release_err) = self
                .inventory
                .release(&request.event_id, &request.category, request.quantity)
                .await
            {
                error!(
                    order = %order_id,
                    error = %release_err,
                    "Failed to release inventory after ledger write failure"
                );
            }
            return Err(match e {
                StorageError::DuplicateKey(_) => SalesError::DuplicateOrder(order_id),
                other => other.into(),
            });
        }

        // Publish after the ledger write. A crash or broker outage here
        // leaves a RESERVED record with no message; the reaper reconciles
        // such holds instead of this path guessing.
        if let Err(e) = self.publisher.publish(&PurchaseIntent::from_order(&order)).await {
            warn!(order = %order_id, error = %e, "Reserved order enqueue failed");
            return Err(e.into());
        }

        info!(order = %order_id, total = total, "Order reserved and enqueued");
        Ok(order_id)
    }

    /// Mark a reserved order as paid.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the order is currently RESERVED;
    /// `InvalidReference` for unknown order ids.
    pub async fn confirm(&self, id: &OrderId) -> Result<TicketOrder> {
        match self
            .ledger
            .transition(id, &[OrderStatus::Reserved], OrderStatus::Paid)
            .await?
        {
            Some(order) => {
                info!(order = %id, "Order confirmed");
                Ok(order)
            }
            None => Err(self.transition_failure(id, OrderStatus::Paid).await?),
        }
    }

    /// Cancel a reserved order, releasing its inventory.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`OrderIntake::confirm`]; a PAID order cannot be
    /// cancelled through this path.
    pub async fn cancel(&self, id: &OrderId) -> Result<TicketOrder> {
        match cancel_reservation(self.ledger.as_ref(), self.inventory.as_ref(), id).await? {
            Some(order) => {
                info!(order = %id, "Order cancelled");
                Ok(order)
            }
            None => Err(self.transition_failure(id, OrderStatus::Cancelled).await?),
        }
    }

    /// Ledger record for an order.
    ///
    /// # Errors
    ///
    /// `InvalidReference` for unknown order ids.
    pub async fn order(&self, id: &OrderId) -> Result<TicketOrder> {
        self.ledger
            .find(id)
            .await?
            .ok_or_else(|| SalesError::InvalidReference(format!("order {}", id)))
    }

    /// Current availability snapshot for an event.
    ///
    /// # Errors
    ///
    /// `InvalidReference` for unknown event ids.
    pub async fn availability(&self, id: &EventId) -> Result<EventRecord> {
        self.inventory
            .find(id)
            .await?
            .ok_or_else(|| SalesError::InvalidReference(format!("event {}", id)))
    }

    /// Classify a failed conditional transition: wrong current state or
    /// missing record.
    async fn transition_failure(&self, id: &OrderId, to: OrderStatus) -> Result<SalesError> {
        Ok(match self.ledger.find(id).await? {
            Some(order) => SalesError::InvalidStateTransition {
                order_id: id.clone(),
                from: order.status,
                to,
            },
            None => SalesError::InvalidReference(format!("order {}", id)),
        })
    }
}

/// Cancel a reservation: conditional RESERVED -> CANCELLED first, then
/// the compensating release.
///
/// The ledger transition is the guard: a second cancellation (or a
/// concurrent reaper pass) finds no RESERVED record and returns `None`,
/// so the stock is released exactly once. A release failure after the
/// transition is logged, not propagated: retrying the whole cancel would
/// trip the guard, and re-running the release would double-credit stock.
pub(crate) async fn cancel_reservation(
    ledger: &dyn SalesLedger,
    inventory: &dyn InventoryStore,
    id: &OrderId,
) -> std::result::Result<Option<TicketOrder>, StorageError> {
    let Some(order) = ledger
        .transition(id, &[OrderStatus::Reserved], OrderStatus::Cancelled)
        .await?
    else {
        return Ok(None);
    };

    match inventory
        .release(&order.event_id, &order.category, order.quantity)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => warn!(
            order = %id,
            event = %order.event_id,
            "Cancelled order refers to an unknown event or category"
        ),
        Err(e) => error!(
            order = %id,
            error = %e,
            "Failed to release inventory for cancelled order"
        ),
    }

    Ok(Some(order))
}

//! TTL-based release of stale reservations.
//!
//! A RESERVED order holds decremented stock until it is confirmed or
//! cancelled. The `ReservationReaper` runs as a background task in the
//! worker process and cancels reservations that outlived the configured
//! TTL, releasing their inventory through the regular cancellation path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::interfaces::{InventoryStore, SalesLedger};

use super::intake::cancel_reservation;
use super::SalesError;

/// Background task for cancelling expired reservations.
pub struct ReservationReaper {
    ledger: Arc<dyn SalesLedger>,
    inventory: Arc<dyn InventoryStore>,
    ttl: Duration,
    interval: Duration,
}

impl ReservationReaper {
    /// Create a new reaper.
    ///
    /// # Arguments
    /// * `ledger` / `inventory` - the stores to reconcile
    /// * `ttl` - maximum age for an unconfirmed reservation
    pub fn new(
        ledger: Arc<dyn SalesLedger>,
        inventory: Arc<dyn InventoryStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            inventory,
            ttl,
            interval: Duration::from_secs(60),
        }
    }

    /// Set a custom scan interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the reaper as a background task.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(count) if count > 0 => {
                        info!(
                            released = count,
                            ttl_secs = self.ttl.as_secs(),
                            "Reaper released expired reservations"
                        );
                    }
                    Ok(_) => {
                        // Nothing expired, don't log
                    }
                    Err(e) => {
                        warn!(error = %e, "Reaper scan failed");
                    }
                }
            }
        })
    }

    /// Run one scan (also used directly in tests).
    ///
    /// # Errors
    ///
    /// Propagates the stale-reservation query failure; per-order
    /// cancellation failures are logged and skipped.
    pub async fn run_once(&self) -> Result<usize, SalesError> {
        let ttl = chrono::Duration::seconds(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));
        let cutoff = Utc::now() - ttl;

        let stale = self.ledger.stale_reservations(cutoff).await?;

        let mut released = 0;
        for order in stale {
            match cancel_reservation(self.ledger.as_ref(), self.inventory.as_ref(), &order.id)
                .await
            {
                // None: confirmed or cancelled since the scan; not ours.
                Ok(Some(_)) => released += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(order = %order.id, error = %e, "Reaper failed to cancel reservation");
                }
            }
        }

        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{
        BuyerId, EventId, EventRecord, EventStatus, OrderId, OrderStatus, TicketCategory,
        TicketKind, TicketOrder,
    };
    use crate::storage::{MockInventoryStore, MockSalesLedger};

    fn order(id: &str, quantity: u32) -> TicketOrder {
        TicketOrder {
            id: OrderId::from(id),
            event_id: EventId::from("evt-1"),
            buyer_id: BuyerId::from("user-1"),
            category: "Pista".to_string(),
            quantity,
            kind: TicketKind::Inteira,
            unit_price: 100.0,
            total: f64::from(quantity) * 100.0,
            status: OrderStatus::Reserved,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    async fn stores(remaining: u32) -> (Arc<MockSalesLedger>, Arc<MockInventoryStore>) {
        let inventory = Arc::new(MockInventoryStore::new());
        inventory
            .insert(&EventRecord {
                id: EventId::from("evt-1"),
                name: "Show".to_string(),
                status: EventStatus::Active,
                remaining,
                categories: vec![TicketCategory {
                    name: "Pista".to_string(),
                    unit_price: 100.0,
                    remaining,
                }],
            })
            .await
            .unwrap();
        (Arc::new(MockSalesLedger::new()), inventory)
    }

    #[tokio::test]
    async fn releases_expired_reservations() {
        let (ledger, inventory) = stores(10).await;

        // Simulate a reservation that already decremented stock.
        inventory
            .reserve(&EventId::from("evt-1"), "Pista", 3)
            .await
            .unwrap()
            .unwrap();
        ledger.insert(&order("O1", 3)).await.unwrap();

        // TTL of zero: everything RESERVED is already expired.
        let reaper = ReservationReaper::new(ledger.clone(), inventory.clone(), Duration::ZERO);
        // A zero-TTL cutoff lands at "now"; the order was created just
        // before, so it qualifies.
        tokio::time::sleep(Duration::from_millis(5)).await;

        let released = reaper.run_once().await.unwrap();
        assert_eq!(released, 1);

        let snapshot = inventory.find(&EventId::from("evt-1")).await.unwrap().unwrap();
        assert_eq!(snapshot.remaining, 10);

        let cancelled = ledger.find(&OrderId::from("O1")).await.unwrap().unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn leaves_fresh_reservations_alone() {
        let (ledger, inventory) = stores(10).await;

        inventory
            .reserve(&EventId::from("evt-1"), "Pista", 2)
            .await
            .unwrap()
            .unwrap();
        ledger.insert(&order("O1", 2)).await.unwrap();

        let reaper = ReservationReaper::new(
            ledger.clone(),
            inventory.clone(),
            Duration::from_secs(3600),
        );

        let released = reaper.run_once().await.unwrap();
        assert_eq!(released, 0);

        let held = ledger.find(&OrderId::from("O1")).await.unwrap().unwrap();
        assert_eq!(held.status, OrderStatus::Reserved);
    }

    #[tokio::test]
    async fn skips_orders_that_settled_meanwhile() {
        let (ledger, inventory) = stores(10).await;

        inventory
            .reserve(&EventId::from("evt-1"), "Pista", 2)
            .await
            .unwrap()
            .unwrap();
        let mut paid = order("O1", 2);
        paid.status = OrderStatus::Paid;
        ledger.insert(&paid).await.unwrap();

        let reaper = ReservationReaper::new(ledger.clone(), inventory.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let released = reaper.run_once().await.unwrap();
        assert_eq!(released, 0);

        // Paid order kept its stock.
        let snapshot = inventory.find(&EventId::from("evt-1")).await.unwrap().unwrap();
        assert_eq!(snapshot.remaining, 8);
    }
}

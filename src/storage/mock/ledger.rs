//! In-memory SalesLedger.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::interfaces::{Result, SalesLedger, StorageError};
use crate::orders::{OrderId, OrderStatus, TicketOrder};

/// Mutex-guarded order map; the lock is the atomicity boundary.
#[derive(Default)]
pub struct MockSalesLedger {
    orders: Mutex<HashMap<String, TicketOrder>>,
}

impl MockSalesLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (test assertions).
    pub async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }

    /// Whether the ledger holds no records.
    pub async fn is_empty(&self) -> bool {
        self.orders.lock().await.is_empty()
    }
}

#[async_trait]
impl SalesLedger for MockSalesLedger {
    async fn insert(&self, order: &TicketOrder) -> Result<()> {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(order.id.as_str()) {
            return Err(StorageError::DuplicateKey(order.id.to_string()));
        }
        orders.insert(order.id.as_str().to_string(), order.clone());
        Ok(())
    }

    async fn find(&self, id: &OrderId) -> Result<Option<TicketOrder>> {
        Ok(self.orders.lock().await.get(id.as_str()).cloned())
    }

    async fn transition(
        &self,
        id: &OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<TicketOrder>> {
        let mut orders = self.orders.lock().await;

        let Some(order) = orders.get_mut(id.as_str()) else {
            return Ok(None);
        };
        if !from.contains(&order.status) {
            return Ok(None);
        }

        order.status = to;
        Ok(Some(order.clone()))
    }

    async fn claim_settlement(&self, id: &OrderId, at: DateTime<Utc>) -> Result<bool> {
        let mut orders = self.orders.lock().await;

        let Some(order) = orders.get_mut(id.as_str()) else {
            return Ok(false);
        };
        if order.status != OrderStatus::Reserved || order.settled_at.is_some() {
            return Ok(false);
        }

        order.settled_at = Some(at);
        Ok(true)
    }

    async fn stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<Vec<TicketOrder>> {
        let orders = self.orders.lock().await;
        Ok(orders
            .values()
            .filter(|o| o.status == OrderStatus::Reserved && o.created_at < cutoff)
            .cloned()
            .collect())
    }
}

//! Sales ledger interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::orders::{OrderId, OrderStatus, TicketOrder};

use super::Result;

/// Interface for order/reservation persistence.
///
/// One record per order id; the id is the idempotency key and its
/// uniqueness is enforced by the store. State changes go through
/// conditional updates so concurrent writers cannot move a record
/// backwards or apply an effect twice.
///
/// Implementations:
/// - `MongoSalesLedger`: MongoDB storage, partitioned by buyer id
/// - `MockSalesLedger`: in-memory, for tests
#[async_trait]
pub trait SalesLedger: Send + Sync {
    /// Insert a freshly created order record.
    ///
    /// Fails with `StorageError::DuplicateKey` when a record with the
    /// same order id already exists.
    async fn insert(&self, order: &TicketOrder) -> Result<()>;

    /// Fetch an order by id.
    async fn find(&self, id: &OrderId) -> Result<Option<TicketOrder>>;

    /// Conditionally move an order from one of `from` to `to`.
    ///
    /// The predicate (current status in `from`) and the status write are
    /// one atomic store operation. Returns the updated record, or `None`
    /// when no record matched (missing order or a status outside
    /// `from`), which callers surface as an illegal transition.
    async fn transition(
        &self,
        id: &OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<TicketOrder>>;

    /// Claim the settlement of a reserved order.
    ///
    /// Atomically sets the settled-at marker iff the record is RESERVED
    /// and not yet settled. Returns `true` when this call won the claim;
    /// `false` when another delivery already settled the order (or the
    /// record is missing/in another state). Exactly one claim succeeds
    /// per order across any number of redeliveries and worker replicas.
    async fn claim_settlement(&self, id: &OrderId, at: DateTime<Utc>) -> Result<bool>;

    /// Reserved orders created before `cutoff` that never reached a
    /// terminal state; input for TTL reconciliation.
    async fn stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<Vec<TicketOrder>>;
}

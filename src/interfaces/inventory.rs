//! Inventory store interface.

use async_trait::async_trait;

use crate::orders::{EventId, EventRecord};

use super::Result;

/// Interface for event inventory persistence.
///
/// Implementations:
/// - `MongoInventoryStore`: MongoDB storage
/// - `MockInventoryStore`: in-memory, for tests
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Insert a new event record. Event creation itself belongs to
    /// external event management; this is the boundary adapter, used
    /// directly by tests.
    async fn insert(&self, event: &EventRecord) -> Result<()>;

    /// Fetch the current inventory snapshot for an event.
    async fn find(&self, id: &EventId) -> Result<Option<EventRecord>>;

    /// Atomically reserve `quantity` tickets in `category`.
    ///
    /// Predicate and mutation are applied as one indivisible store
    /// operation: the event must be ACTIVE and both the aggregate and
    /// the category's remaining counts must cover `quantity`; on match
    /// both counters are decremented. Returns the post-update record, or
    /// `None` when the predicate did not match (insufficient stock,
    /// inactive event, or unknown category), in which case nothing was
    /// mutated.
    async fn reserve(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>>;

    /// Atomically release `quantity` previously reserved tickets back to
    /// `category`.
    ///
    /// No upper-bound check: release quantities come from a prior
    /// successful reservation. Returns the post-update record, or `None`
    /// when the event or category does not exist.
    async fn release(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>>;
}

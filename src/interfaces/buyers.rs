//! Buyer directory interface.

use async_trait::async_trait;

use crate::orders::{Buyer, BuyerId};

use super::Result;

/// Read-mostly lookup of buyers, maintained by external user management.
///
/// Implementations:
/// - `MongoBuyerDirectory`: MongoDB storage
/// - `MockBuyerDirectory`: in-memory, for tests
#[async_trait]
pub trait BuyerDirectory: Send + Sync {
    /// Insert a buyer record (boundary adapter, used directly by tests).
    async fn insert(&self, buyer: &Buyer) -> Result<()>;

    /// Resolve a buyer reference.
    async fn find(&self, id: &BuyerId) -> Result<Option<Buyer>>;
}

//! Store interfaces.
//!
//! Traits for the inventory, sales-ledger, and buyer-directory backends.
//! The atomic conditional updates are part of the contract: every
//! implementation must evaluate the predicate and apply the mutation as
//! one indivisible step, because they are the pipeline's only
//! serialization point.

mod buyers;
mod inventory;
mod ledger;

pub use buyers::BuyerDirectory;
pub use inventory::InventoryStore;
pub use ledger::SalesLedger;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),
}

impl StorageError {
    /// Whether retrying the operation later could succeed.
    ///
    /// Duplicate keys and malformed documents are permanent; driver-level
    /// failures (connection loss, timeouts) are worth a redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Mongo(_))
    }
}

//! Store implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use crate::interfaces::StorageError;

pub mod mock;
pub mod mongodb;

pub use mock::{MockBuyerDirectory, MockInventoryStore, MockSalesLedger};
pub use mongodb::{MongoBuyerDirectory, MongoInventoryStore, MongoSalesLedger};

/// Connect to MongoDB and construct the three stores.
///
/// One client per process; the stores share it and are passed down by
/// reference into the services.
///
/// # Errors
///
/// Fails when the client cannot be created or index creation fails.
pub async fn init_storage(
    config: &StorageConfig,
) -> Result<
    (
        Arc<MongoInventoryStore>,
        Arc<MongoSalesLedger>,
        Arc<MongoBuyerDirectory>,
    ),
    StorageError,
> {
    info!(uri = %config.uri, database = %config.database, "Connecting to MongoDB");

    let client = ::mongodb::Client::with_uri_str(&config.uri).await?;

    let inventory = Arc::new(MongoInventoryStore::new(&client, &config.database).await?);
    let ledger = Arc::new(MongoSalesLedger::new(&client, &config.database).await?);
    let buyers = Arc::new(MongoBuyerDirectory::new(&client, &config.database).await?);

    Ok((inventory, ledger, buyers))
}

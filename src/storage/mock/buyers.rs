//! In-memory BuyerDirectory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::interfaces::{BuyerDirectory, Result, StorageError};
use crate::orders::{Buyer, BuyerId};

/// Mutex-guarded buyer map.
#[derive(Default)]
pub struct MockBuyerDirectory {
    buyers: Mutex<HashMap<String, Buyer>>,
}

impl MockBuyerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BuyerDirectory for MockBuyerDirectory {
    async fn insert(&self, buyer: &Buyer) -> Result<()> {
        let mut buyers = self.buyers.lock().await;
        if buyers.contains_key(buyer.id.as_str()) {
            return Err(StorageError::DuplicateKey(buyer.id.to_string()));
        }
        buyers.insert(buyer.id.as_str().to_string(), buyer.clone());
        Ok(())
    }

    async fn find(&self, id: &BuyerId) -> Result<Option<Buyer>> {
        Ok(self.buyers.lock().await.get(id.as_str()).cloned())
    }
}

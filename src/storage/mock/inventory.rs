//! In-memory InventoryStore.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::interfaces::{InventoryStore, Result, StorageError};
use crate::orders::{EventId, EventRecord, EventStatus};

/// Mutex-guarded inventory map; the lock is the atomicity boundary.
#[derive(Default)]
pub struct MockInventoryStore {
    events: Mutex<HashMap<String, EventRecord>>,
}

impl MockInventoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MockInventoryStore {
    async fn insert(&self, event: &EventRecord) -> Result<()> {
        let mut events = self.events.lock().await;
        if events.contains_key(event.id.as_str()) {
            return Err(StorageError::DuplicateKey(event.id.to_string()));
        }
        events.insert(event.id.as_str().to_string(), event.clone());
        Ok(())
    }

    async fn find(&self, id: &EventId) -> Result<Option<EventRecord>> {
        Ok(self.events.lock().await.get(id.as_str()).cloned())
    }

    async fn reserve(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>> {
        let mut events = self.events.lock().await;

        let Some(event) = events.get_mut(id.as_str()) else {
            return Ok(None);
        };

        // Same predicate the MongoDB filter expresses; nothing mutates
        // unless every condition holds.
        if event.status != EventStatus::Active || event.remaining < quantity {
            return Ok(None);
        }
        let Some(cat) = event.categories.iter_mut().find(|c| c.name == category) else {
            return Ok(None);
        };
        if cat.remaining < quantity {
            return Ok(None);
        }

        cat.remaining -= quantity;
        event.remaining -= quantity;
        if event.remaining == 0 {
            event.status = EventStatus::SoldOut;
        }

        Ok(Some(event.clone()))
    }

    async fn release(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>> {
        let mut events = self.events.lock().await;

        let Some(event) = events.get_mut(id.as_str()) else {
            return Ok(None);
        };
        let Some(cat) = event.categories.iter_mut().find(|c| c.name == category) else {
            return Ok(None);
        };

        cat.remaining += quantity;
        event.remaining += quantity;
        if event.status == EventStatus::SoldOut && event.remaining > 0 {
            event.status = EventStatus::Active;
        }

        Ok(Some(event.clone()))
    }
}

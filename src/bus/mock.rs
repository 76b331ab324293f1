//! In-memory channel mock for tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::orders::PurchaseIntent;

use super::{ChannelError, IntentPublisher, Result};

/// Records published intents instead of talking to a broker.
///
/// Can be switched into a failing mode to simulate broker outages.
#[derive(Default)]
pub struct MockChannel {
    published: Mutex<Vec<PurchaseIntent>>,
    failing: AtomicBool,
}

impl MockChannel {
    /// Create an empty recording channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (simulated broker outage).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything published so far.
    pub async fn published(&self) -> Vec<PurchaseIntent> {
        self.published.lock().await.clone()
    }

    /// Drain the recorded intents, simulating queue consumption.
    pub async fn drain(&self) -> Vec<PurchaseIntent> {
        std::mem::take(&mut *self.published.lock().await)
    }
}

#[async_trait]
impl IntentPublisher for MockChannel {
    async fn publish(&self, intent: &PurchaseIntent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Publish("mock broker unavailable".to_string()));
        }
        self.published.lock().await.push(intent.clone());
        Ok(())
    }
}

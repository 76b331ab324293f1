//! Durable order queue.
//!
//! This module contains:
//! - `IntentPublisher` trait: fire-and-forget publication of purchase
//!   intents with at-least-once delivery toward consumers
//! - `DeadLetter`: quarantine envelope for messages that can never be
//!   processed
//! - Implementations: AMQP (RabbitMQ), Mock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orders::PurchaseIntent;

pub mod amqp;
pub mod mock;

pub use amqp::{AmqpChannel, QueueSession};
pub use mock::MockChannel;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors that can occur during channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Consume failed: {0}")]
    Consume(String),
}

/// Build the dead-letter queue name for an order queue.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}

/// Quarantined message: the original payload plus why it could not be
/// processed. Parked on the dead-letter queue for manual review and
/// replay, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Human-readable rejection reason.
    pub reason: String,
    /// Original payload, lossily decoded for inspection.
    pub payload: String,
    /// When the rejection occurred.
    pub occurred_at: DateTime<Utc>,
    /// Which component parked the message.
    pub source: String,
}

impl DeadLetter {
    /// Wrap a rejected payload.
    pub fn new(reason: impl Into<String>, payload: &[u8], source: &str) -> Self {
        Self {
            reason: reason.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            occurred_at: Utc::now(),
            source: source.to_string(),
        }
    }
}

/// Interface for publishing purchase intents to the order queue.
///
/// Implementations:
/// - `AmqpChannel`: RabbitMQ, persistent delivery with publisher confirms
/// - `MockChannel`: in-memory recording, for tests
#[async_trait]
pub trait IntentPublisher: Send + Sync {
    /// Publish one intent with persistent delivery.
    ///
    /// Returns once the broker confirmed the message; transient broker
    /// failures are retried internally with bounded backoff.
    async fn publish(&self, intent: &PurchaseIntent) -> Result<()>;
}

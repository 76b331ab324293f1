//! AMQP (RabbitMQ) order queue implementation.
//!
//! Publishes purchase intents to a named durable queue with persistent
//! delivery and publisher confirms. Consumers run with a prefetch of one
//! in-flight message per connection; scaling out means more worker
//! processes, not more prefetch.

use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, error, info};

use crate::config::MessagingConfig;
use crate::orders::PurchaseIntent;

use super::{dead_letter_queue, ChannelError, DeadLetter, IntentPublisher, Result};

/// AMQP delivery mode for messages persisted to disk.
const PERSISTENT: u8 = 2;

/// Publisher-side handle to the order queue.
///
/// Holds a small connection pool created once at process start; request
/// handling tasks share it by reference.
pub struct AmqpChannel {
    pool: Pool,
    queue: String,
    publish_retries: usize,
}

impl AmqpChannel {
    /// Connect and declare the order queue and its dead-letter companion.
    pub async fn connect(config: &MessagingConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| ChannelError::Connection(format!("Failed to create pool: {}", e)))?;

        // Verify connectivity and make the declarations durable up front.
        let conn = pool
            .get()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to connect: {}", e)))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to create channel: {}", e)))?;
        declare_queues(&channel, &config.queue).await?;

        info!(queue = %config.queue, url = %config.url, "Connected to AMQP");

        Ok(Self {
            pool,
            queue: config.queue.clone(),
            publish_retries: config.publish_retries,
        })
    }

    /// Get a confirm-mode channel from the pool.
    async fn channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            ChannelError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to enable confirms: {}", e)))?;

        Ok(channel)
    }

    /// Publish a persistent payload to `routing_key` with bounded retry.
    async fn publish_raw(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        // Exponential backoff with jitter to prevent thundering herd
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.publish_retries)
            .with_jitter()
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            // Fresh channel for each attempt (handles reconnection)
            let channel = match self.channel().await {
                Ok(ch) => ch,
                Err(e) => {
                    error!(attempt = attempt + 1, error = %e, "Failed to get channel, retrying...");
                    last_error = Some(e);
                    continue;
                }
            };

            let properties = BasicProperties::default()
                .with_content_type("application/json".into())
                .with_delivery_mode(PERSISTENT);

            match channel
                .basic_publish(
                    "",
                    routing_key,
                    BasicPublishOptions::default(),
                    payload,
                    properties,
                )
                .await
            {
                Ok(confirm) => match confirm.await {
                    Ok(_) => {
                        debug!(queue = %routing_key, "Published message");
                        return Ok(());
                    }
                    Err(e) => {
                        error!(attempt = attempt + 1, error = %e, "Publish confirmation failed, retrying...");
                        last_error = Some(ChannelError::Publish(format!(
                            "Publish confirmation failed: {}",
                            e
                        )));
                    }
                },
                Err(e) => {
                    error!(attempt = attempt + 1, error = %e, "Publish failed, retrying...");
                    last_error = Some(ChannelError::Publish(format!("Failed to publish: {}", e)));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChannelError::Publish("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl IntentPublisher for AmqpChannel {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(order = %intent.order_id))]
    async fn publish(&self, intent: &PurchaseIntent) -> Result<()> {
        let payload = intent
            .to_bytes()
            .map_err(|e| ChannelError::Publish(format!("Failed to encode intent: {}", e)))?;
        self.publish_raw(&self.queue, &payload).await
    }
}

/// Declare the order queue and its dead-letter queue, both durable.
async fn declare_queues(channel: &Channel, queue: &str) -> Result<()> {
    for name in [queue.to_string(), dead_letter_queue(queue)] {
        channel
            .queue_declare(
                &name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ChannelError::Connection(format!("Failed to declare queue {}: {}", name, e))
            })?;
    }
    Ok(())
}

/// Consumer-side session: one long-lived connection, one channel, one
/// consumer with prefetch 1.
///
/// The settlement worker opens one per connection attempt and drops it on
/// failure; unacknowledged deliveries return to the queue.
pub struct QueueSession {
    connection: Connection,
    channel: Channel,
    consumer: lapin::Consumer,
    dead_letter: String,
}

impl QueueSession {
    /// Connect, declare, set the prefetch window, and start consuming.
    pub async fn open(url: &str, queue: &str, prefetch: u16, tag: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to connect: {}", e)))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to enable confirms: {}", e)))?;

        declare_queues(&channel, queue).await?;

        // One message in flight at a time per worker instance.
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| ChannelError::Consume(format!("Failed to set prefetch: {}", e)))?;

        let consumer = channel
            .basic_consume(
                queue,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ChannelError::Consume(format!("Failed to start consumer: {}", e)))?;

        info!(queue = %queue, prefetch = prefetch, "Consuming from order queue");

        Ok(Self {
            connection,
            channel,
            consumer,
            dead_letter: dead_letter_queue(queue),
        })
    }

    /// Next delivery from the queue; `None` when the stream ends.
    pub async fn next(&mut self) -> Option<std::result::Result<Delivery, lapin::Error>> {
        self.consumer.next().await
    }

    /// Park a poison message on the dead-letter queue.
    ///
    /// Published persistent and confirmed on this session's channel; the
    /// caller acknowledges the original delivery only after this returns.
    pub async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let payload = serde_json::to_vec(letter)
            .map_err(|e| ChannelError::Publish(format!("Failed to encode dead letter: {}", e)))?;

        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.dead_letter,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| ChannelError::Publish(format!("Failed to publish dead letter: {}", e)))?;

        confirm
            .await
            .map_err(|e| ChannelError::Publish(format!("Dead letter confirmation failed: {}", e)))?;

        Ok(())
    }

    /// Close the session before a reconnect attempt.
    pub async fn close(self) {
        let _ = self.channel.close(0, "reconnecting").await;
        let _ = self.connection.close(0, "reconnecting").await;
    }
}

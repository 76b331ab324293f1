//! Settlement: the consumer side of the pipeline.
//!
//! `Settlement::process` applies the business effects for one queue
//! payload and reports what happened; `SettlementWorker` owns the broker
//! connection loop and turns each outcome into the right acknowledgment.
//! A message is acknowledged only after its ledger write completed;
//! poison messages are parked on the dead-letter queue first, transient
//! failures are negatively acknowledged for redelivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{debug, error, info, warn};

use crate::bus::{ChannelError, DeadLetter, QueueSession};
use crate::config::MessagingConfig;
use crate::interfaces::{BuyerDirectory, InventoryStore, SalesLedger, StorageError};
use crate::orders::{OrderId, PurchaseIntent};

/// Component name stamped on dead letters.
const SOURCE: &str = "settlement-worker";

/// What processing one payload amounted to.
#[derive(Debug)]
pub enum Outcome {
    /// Effects applied and recorded; first delivery of this order.
    Settled(OrderId),
    /// Redelivery of an already-processed order; no side effects.
    Duplicate(OrderId),
    /// The message can never be processed (malformed, unresolvable
    /// references, inconsistent amounts); park it and move on.
    Rejected { reason: String },
}

/// Idempotent settlement of purchase intents.
pub struct Settlement {
    ledger: Arc<dyn SalesLedger>,
    inventory: Arc<dyn InventoryStore>,
    buyers: Arc<dyn BuyerDirectory>,
}

impl Settlement {
    /// Wire the settlement logic against its stores.
    pub fn new(
        ledger: Arc<dyn SalesLedger>,
        inventory: Arc<dyn InventoryStore>,
        buyers: Arc<dyn BuyerDirectory>,
    ) -> Self {
        Self {
            ledger,
            inventory,
            buyers,
        }
    }

    /// Process one raw queue payload.
    ///
    /// Returns the outcome for acknowledgment purposes. Only transient
    /// store failures surface as `Err`; everything permanent is an
    /// `Outcome` so the caller can acknowledge deliberately.
    ///
    /// # Errors
    ///
    /// Store errors worth a redelivery (connection loss, timeouts).
    pub async fn process(&self, payload: &[u8]) -> Result<Outcome, StorageError> {
        let intent = match PurchaseIntent::from_bytes(payload) {
            Ok(intent) => intent,
            Err(reason) => {
                return Ok(Outcome::Rejected {
                    reason: format!("malformed intent: {}", reason),
                })
            }
        };

        // Idempotency check before any effect.
        let Some(order) = self.ledger.find(&intent.order_id).await? else {
            // The ledger write precedes the publish, so a missing record
            // cannot heal by waiting; requeueing would loop forever.
            return Ok(Outcome::Rejected {
                reason: format!("no ledger record for order {}", intent.order_id),
            });
        };
        if order.status.is_terminal() || order.settled_at.is_some() {
            return Ok(Outcome::Duplicate(intent.order_id));
        }

        // Resolve references.
        if self.buyers.find(&intent.buyer_id).await?.is_none() {
            return Ok(Outcome::Rejected {
                reason: format!("unknown buyer {}", intent.buyer_id),
            });
        }
        if self.inventory.find(&intent.event_id).await?.is_none() {
            return Ok(Outcome::Rejected {
                reason: format!("unknown event {}", intent.event_id),
            });
        }

        // Verify the amounts before finalizing.
        if !intent.total_consistent() {
            return Ok(Outcome::Rejected {
                reason: format!(
                    "total {} does not match {} x {}",
                    intent.total, intent.quantity, intent.unit_price
                ),
            });
        }
        if (order.total - intent.total).abs() >= 0.005 {
            return Ok(Outcome::Rejected {
                reason: format!(
                    "message total {} disagrees with ledger total {}",
                    intent.total, order.total
                ),
            });
        }

        // Atomic claim: across redeliveries and worker replicas exactly
        // one of these conditional updates matches.
        if self.ledger.claim_settlement(&intent.order_id, Utc::now()).await? {
            Ok(Outcome::Settled(intent.order_id))
        } else {
            Ok(Outcome::Duplicate(intent.order_id))
        }
    }
}

/// Long-running consumer process: connect, drain, reconnect forever.
pub struct SettlementWorker {
    settlement: Settlement,
    messaging: MessagingConfig,
}

impl SettlementWorker {
    /// Wire the worker against its settlement logic and queue settings.
    pub fn new(settlement: Settlement, messaging: MessagingConfig) -> Self {
        Self {
            settlement,
            messaging,
        }
    }

    /// Consume until the process is stopped.
    ///
    /// On any broker failure the session is closed and reopened after a
    /// fixed delay; unacknowledged messages stay queued for redelivery,
    /// so nothing is lost across reconnects.
    pub async fn run(&self) {
        let delay = Duration::from_secs(self.messaging.reconnect_delay_secs);
        let tag = format!("boxoffice-worker-{}", std::process::id());

        loop {
            match QueueSession::open(
                &self.messaging.url,
                &self.messaging.queue,
                self.messaging.prefetch,
                &tag,
            )
            .await
            {
                Ok(mut session) => {
                    if let Err(e) = self.drain(&mut session).await {
                        error!(error = %e, "Consumer failed, reconnecting");
                    } else {
                        info!("Consumer stream ended, reconnecting");
                    }
                    session.close().await;
                }
                Err(e) => {
                    error!(error = %e, delay_secs = delay.as_secs(), "Broker unavailable, retrying");
                }
            }

            tokio::time::sleep(delay).await;
        }
    }

    /// Process deliveries until the stream ends or the channel fails.
    async fn drain(&self, session: &mut QueueSession) -> Result<(), ChannelError> {
        while let Some(delivery) = session.next().await {
            let delivery =
                delivery.map_err(|e| ChannelError::Consume(format!("Delivery error: {}", e)))?;
            self.handle_delivery(session, delivery).await?;
        }
        Ok(())
    }

    /// Settle one delivery and acknowledge accordingly.
    ///
    /// Channel-level failures (ack, nack, dead-letter publish) propagate
    /// and force a reconnect; the delivery stays unacknowledged and will
    /// come back.
    async fn handle_delivery(
        &self,
        session: &QueueSession,
        delivery: Delivery,
    ) -> Result<(), ChannelError> {
        match self.settlement.process(&delivery.data).await {
            Ok(Outcome::Settled(order_id)) => {
                info!(order = %order_id, "Order settled");
                ack(&delivery).await
            }
            Ok(Outcome::Duplicate(order_id)) => {
                debug!(order = %order_id, "Duplicate delivery, no effects");
                ack(&delivery).await
            }
            Ok(Outcome::Rejected { reason }) => {
                warn!(reason = %reason, "Message rejected, parking on dead-letter queue");
                session
                    .dead_letter(&DeadLetter::new(reason.as_str(), &delivery.data, SOURCE))
                    .await?;
                ack(&delivery).await
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient store failure, requeueing");
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| ChannelError::Consume(format!("Failed to nack: {}", e)))?;
                // Brief pause so a down store does not hot-loop the same
                // redelivery.
                tokio::time::sleep(Duration::from_secs(self.messaging.reconnect_delay_secs)).await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Permanent store failure, parking on dead-letter queue");
                session
                    .dead_letter(&DeadLetter::new(
                        format!("store rejected message: {}", e),
                        &delivery.data,
                        SOURCE,
                    ))
                    .await?;
                ack(&delivery).await
            }
        }
    }
}

async fn ack(delivery: &Delivery) -> Result<(), ChannelError> {
    delivery
        .ack(BasicAckOptions::default())
        .await
        .map_err(|e| ChannelError::Consume(format!("Failed to ack: {}", e)))
}

//! boxoffice-worker: settlement worker
//!
//! Drains the order queue one message at a time, settles each order
//! idempotently, and acknowledges only after the ledger write completed.
//! Replicas scale horizontally; each keeps its own prefetch-1 window.
//!
//! ## Architecture
//! ```text
//! [RabbitMQ: fila_pedidos] -> [boxoffice-worker] -> [MongoDB: vendas (settle)]
//!                                   |
//!                                   +-> [RabbitMQ: fila_pedidos.dead] (poison messages)
//!                                   +-> [reaper: release expired reservations]
//! ```
//!
//! ## Configuration
//! - BOXOFFICE_CONFIG: path to a YAML configuration file
//! - BOXOFFICE__WORKER__RESERVATION_TTL_SECS: enable the reservation reaper
//! - BOXOFFICE_LOG: tracing filter (default "info")

use std::time::Duration;

use tracing::{error, info};

use boxoffice::config::Config;
use boxoffice::services::{ReservationReaper, Settlement, SettlementWorker};
use boxoffice::storage::init_storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boxoffice::utils::bootstrap::init_tracing();

    let config_path = boxoffice::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting boxoffice-worker");

    let (inventory, ledger, buyers) = init_storage(&config.storage).await?;
    info!("Storage initialized");

    let settlement = Settlement::new(ledger.clone(), inventory.clone(), buyers);

    let reaper_handle = match config.worker.reservation_ttl_secs {
        Some(ttl_secs) => {
            info!(ttl_secs = ttl_secs, "Reservation reaper enabled");
            let reaper = ReservationReaper::new(
                ledger.clone(),
                inventory.clone(),
                Duration::from_secs(ttl_secs),
            )
            .with_interval(Duration::from_secs(config.worker.reaper_interval_secs));
            Some(reaper.spawn())
        }
        None => {
            info!("Reservation reaper disabled (no TTL configured)");
            None
        }
    };

    let worker = SettlementWorker::new(settlement, config.messaging.clone());

    info!("Worker running, press Ctrl+C to exit");

    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    if let Some(handle) = reaper_handle {
        handle.abort();
    }

    Ok(())
}

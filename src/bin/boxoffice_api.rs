//! boxoffice-api: purchase intake service
//!
//! Accepts purchase submissions, reserves inventory atomically, records
//! the order, and enqueues it for asynchronous settlement.
//!
//! ## Architecture
//! ```text
//! [Client] -> [boxoffice-api] -> [MongoDB: eventos (atomic reserve)]
//!                   |
//!                   +----------> [MongoDB: vendas (RESERVED record)]
//!                   |
//!                   +----------> [RabbitMQ: fila_pedidos] -> [boxoffice-worker]
//! ```
//!
//! ## Configuration
//! - BOXOFFICE_CONFIG: path to a YAML configuration file
//! - BOXOFFICE__STORAGE__URI / BOXOFFICE__MESSAGING__URL: store/broker overrides
//! - BOXOFFICE_LOG: tracing filter (default "info")

use std::sync::Arc;

use tonic::transport::Server;
use tracing::{error, info};

use boxoffice::bus::AmqpChannel;
use boxoffice::config::Config;
use boxoffice::grpc::SalesService;
use boxoffice::proto::sales_server::SalesServer;
use boxoffice::services::OrderIntake;
use boxoffice::storage::init_storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boxoffice::utils::bootstrap::init_tracing();

    let config_path = boxoffice::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting boxoffice-api");

    let (inventory, ledger, _buyers) = init_storage(&config.storage).await?;
    info!("Storage initialized");

    let publisher = Arc::new(AmqpChannel::connect(&config.messaging).await?);

    let intake = Arc::new(OrderIntake::new(inventory, ledger, publisher));
    let service = SalesService::new(intake);

    let address = config.server.bind_address().parse()?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<SalesServer<SalesService>>()
        .await;

    info!(address = %address, "Sales service listening");

    Server::builder()
        .add_service(health_service)
        .add_service(SalesServer::new(service))
        .serve(address)
        .await?;

    Ok(())
}

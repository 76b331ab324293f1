//! boxoffice - asynchronous ticket sales
//!
//! An order reservation and fulfillment pipeline: the intake service
//! reserves inventory with atomic conditional updates, records the order
//! in a sales ledger, and enqueues a purchase intent on a durable queue;
//! settlement workers drain the queue idempotently, one message in
//! flight at a time.

pub mod bus;
pub mod config;
pub mod grpc;
pub mod interfaces;
pub mod orders;
pub mod services;
pub mod storage;
pub mod utils;

pub mod proto {
    tonic::include_proto!("boxoffice");
}

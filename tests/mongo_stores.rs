//! MongoDB store integration tests.
//!
//! Run with: cargo test --test mongo_stores -- --ignored --nocapture
//!
//! Requires: MONGODB_URI env var or MongoDB on localhost:27017

use std::sync::Arc;

use boxoffice::interfaces::{InventoryStore, SalesLedger, StorageError};
use boxoffice::orders::{
    BuyerId, EventId, EventRecord, EventStatus, OrderId, OrderStatus, TicketCategory, TicketKind,
    TicketOrder,
};
use boxoffice::storage::{MongoInventoryStore, MongoSalesLedger};
use chrono::Utc;
use serial_test::serial;

fn mongodb_uri() -> String {
    std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

const TEST_DATABASE: &str = "boxoffice_test";

async fn client() -> mongodb::Client {
    mongodb::Client::with_uri_str(&mongodb_uri())
        .await
        .expect("Failed to connect to MongoDB")
}

/// Each test drops the whole test database first; tests are serialized.
async fn reset(client: &mongodb::Client) {
    client
        .database(TEST_DATABASE)
        .drop()
        .await
        .expect("Failed to drop test database");
}

fn test_event(id: &str, remaining: u32) -> EventRecord {
    EventRecord {
        id: EventId::from(id),
        name: "Integration Show".to_string(),
        status: EventStatus::Active,
        remaining,
        categories: vec![
            TicketCategory {
                name: "Pista".to_string(),
                unit_price: 120.0,
                remaining,
            },
        ],
    }
}

fn test_order(id: &str, quantity: u32) -> TicketOrder {
    TicketOrder {
        id: OrderId::from(id),
        event_id: EventId::from("evt-int"),
        buyer_id: BuyerId::from("user-int"),
        category: "Pista".to_string(),
        quantity,
        kind: TicketKind::Inteira,
        unit_price: 120.0,
        total: f64::from(quantity) * 120.0,
        status: OrderStatus::Reserved,
        created_at: Utc::now(),
        settled_at: None,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn reserve_decrements_both_counters_atomically() {
    let client = client().await;
    reset(&client).await;

    let store = MongoInventoryStore::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create inventory store");
    store.insert(&test_event("evt-int", 10)).await.unwrap();

    let updated = store
        .reserve(&EventId::from("evt-int"), "Pista", 4)
        .await
        .unwrap()
        .expect("predicate should match");

    assert_eq!(updated.remaining, 6);
    assert_eq!(updated.category("Pista").unwrap().remaining, 6);

    // Predicate failure mutates nothing.
    let failed = store
        .reserve(&EventId::from("evt-int"), "Pista", 7)
        .await
        .unwrap();
    assert!(failed.is_none());

    let snapshot = store.find(&EventId::from("evt-int")).await.unwrap().unwrap();
    assert_eq!(snapshot.remaining, 6);
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn concurrent_reservations_never_oversell() {
    let client = client().await;
    reset(&client).await;

    let store = Arc::new(
        MongoInventoryStore::new(&client, TEST_DATABASE)
            .await
            .expect("Failed to create inventory store"),
    );
    store.insert(&test_event("evt-int", 5)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .reserve(&EventId::from("evt-int"), "Pista", 1)
                .await
                .unwrap()
                .is_some()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 5);

    let snapshot = store.find(&EventId::from("evt-int")).await.unwrap().unwrap();
    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.status, EventStatus::SoldOut);
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn release_restores_and_reactivates() {
    let client = client().await;
    reset(&client).await;

    let store = MongoInventoryStore::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create inventory store");
    store.insert(&test_event("evt-int", 2)).await.unwrap();

    store
        .reserve(&EventId::from("evt-int"), "Pista", 2)
        .await
        .unwrap()
        .expect("predicate should match");

    let restored = store
        .release(&EventId::from("evt-int"), "Pista", 2)
        .await
        .unwrap()
        .expect("event should exist");

    assert_eq!(restored.remaining, 2);
    assert_eq!(restored.status, EventStatus::Active);
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn ledger_enforces_the_idempotency_key() {
    let client = client().await;
    reset(&client).await;

    let ledger = MongoSalesLedger::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create ledger");

    ledger.insert(&test_order("ord-1", 2)).await.unwrap();
    let err = ledger.insert(&test_order("ord-1", 2)).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey(_)));
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn settlement_claim_wins_exactly_once() {
    let client = client().await;
    reset(&client).await;

    let ledger = MongoSalesLedger::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create ledger");
    ledger.insert(&test_order("ord-1", 1)).await.unwrap();

    let id = OrderId::from("ord-1");
    let first = ledger.claim_settlement(&id, Utc::now()).await.unwrap();
    let second = ledger.claim_settlement(&id, Utc::now()).await.unwrap();

    assert!(first);
    assert!(!second);

    let stored = ledger.find(&id).await.unwrap().unwrap();
    assert!(stored.settled_at.is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn conditional_transition_guards_the_state_machine() {
    let client = client().await;
    reset(&client).await;

    let ledger = MongoSalesLedger::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create ledger");
    ledger.insert(&test_order("ord-1", 1)).await.unwrap();

    let id = OrderId::from("ord-1");

    let cancelled = ledger
        .transition(&id, &[OrderStatus::Reserved], OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.unwrap().status, OrderStatus::Cancelled);

    // Second attempt finds no RESERVED record.
    let again = ledger
        .transition(&id, &[OrderStatus::Reserved], OrderStatus::Cancelled)
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires running MongoDB instance"]
async fn stale_reservations_respect_the_cutoff() {
    let client = client().await;
    reset(&client).await;

    let ledger = MongoSalesLedger::new(&client, TEST_DATABASE)
        .await
        .expect("Failed to create ledger");

    let mut old = test_order("ord-old", 1);
    old.created_at = Utc::now() - chrono::Duration::hours(2);
    ledger.insert(&old).await.unwrap();
    ledger.insert(&test_order("ord-new", 1)).await.unwrap();

    let cutoff = Utc::now() - chrono::Duration::hours(1);
    let stale = ledger.stale_reservations(cutoff).await.unwrap();

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, OrderId::from("ord-old"));
}

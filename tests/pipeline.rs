//! End-to-end pipeline tests against the in-memory backends.
//!
//! These cover the correctness properties of the reservation and
//! fulfillment pipeline (no oversell, idempotent settlement,
//! conservation under cancel) without requiring MongoDB or RabbitMQ:
//! the mock stores implement the same conditional-update contract as the
//! real adapters.

use std::sync::Arc;

use boxoffice::bus::MockChannel;
use boxoffice::interfaces::{BuyerDirectory, InventoryStore, SalesLedger};
use boxoffice::orders::{
    Buyer, BuyerId, EventId, EventRecord, EventStatus, OrderStatus, PurchaseIntent,
    TicketCategory, TicketKind,
};
use boxoffice::services::{OrderIntake, Outcome, PurchaseRequest, SalesError, Settlement};
use boxoffice::storage::{MockBuyerDirectory, MockInventoryStore, MockSalesLedger};

struct Pipeline {
    inventory: Arc<MockInventoryStore>,
    ledger: Arc<MockSalesLedger>,
    channel: Arc<MockChannel>,
    intake: OrderIntake,
    settlement: Settlement,
}

async fn pipeline(event: EventRecord) -> Pipeline {
    let inventory = Arc::new(MockInventoryStore::new());
    let ledger = Arc::new(MockSalesLedger::new());
    let buyers = Arc::new(MockBuyerDirectory::new());
    let channel = Arc::new(MockChannel::new());

    inventory.insert(&event).await.unwrap();
    buyers
        .insert(&Buyer {
            id: BuyerId::from("user-1"),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
        })
        .await
        .unwrap();

    let intake = OrderIntake::new(inventory.clone(), ledger.clone(), channel.clone());
    let settlement = Settlement::new(ledger.clone(), inventory.clone(), buyers);

    Pipeline {
        inventory,
        ledger,
        channel,
        intake,
        settlement,
    }
}

fn event(id: &str, category: &str, price: f64, remaining: u32) -> EventRecord {
    EventRecord {
        id: EventId::from(id),
        name: format!("Event {}", id),
        status: EventStatus::Active,
        remaining,
        categories: vec![TicketCategory {
            name: category.to_string(),
            unit_price: price,
            remaining,
        }],
    }
}

fn request(event_id: &str, category: &str, quantity: u32) -> PurchaseRequest {
    PurchaseRequest {
        event_id: EventId::from(event_id),
        buyer_id: BuyerId::from("user-1"),
        category: category.to_string(),
        quantity,
        kind: TicketKind::Inteira,
    }
}

#[tokio::test]
async fn no_oversell_under_concurrent_submissions() {
    // 16 buyers race for 5 tickets; exactly 5 reservations may succeed.
    let px = pipeline(event("evt-1", "Pista", 80.0, 5)).await;

    let submissions = (0..16).map(|_| px.intake.submit(request("evt-1", "Pista", 1)));
    let results = futures::future::join_all(submissions).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SalesError::InsufficientInventory { .. })))
        .count();

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 11);

    let snapshot = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.status, EventStatus::SoldOut);

    // One ledger record and one queue message per accepted purchase.
    assert_eq!(px.ledger.len().await, 5);
    assert_eq!(px.channel.published().await.len(), 5);
}

#[tokio::test]
async fn last_ticket_scenario() {
    // Event E1, category Pista, remaining = 1; two concurrent requests.
    let px = pipeline(event("E1", "Pista", 100.0, 1)).await;

    let (a, b) = tokio::join!(
        px.intake.submit(request("E1", "Pista", 1)),
        px.intake.submit(request("E1", "Pista", 1))
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    assert!([&a, &b]
        .iter()
        .any(|r| matches!(r, Err(SalesError::InsufficientInventory { .. }))));

    let snapshot = px.inventory.find(&EventId::from("E1")).await.unwrap().unwrap();
    assert_eq!(snapshot.remaining, 0);
}

#[tokio::test]
async fn submitted_orders_settle_through_the_queue() {
    let px = pipeline(event("evt-1", "Pista", 100.0, 10)).await;

    let order_id = px.intake.submit(request("evt-1", "Pista", 2)).await.unwrap();

    // Drain the queue the way a worker would.
    let intents = px.channel.drain().await;
    assert_eq!(intents.len(), 1);

    let payload = intents[0].to_bytes().unwrap();
    let outcome = px.settlement.process(&payload).await.unwrap();
    assert!(matches!(outcome, Outcome::Settled(ref id) if *id == order_id));

    let order = px.ledger.find(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Reserved);
    assert!(order.settled_at.is_some());
}

#[tokio::test]
async fn duplicate_delivery_settles_once() {
    // Order O1's message delivered twice: one ledger effect, one decrement.
    let px = pipeline(event("evt-1", "Pista", 100.0, 10)).await;

    let order_id = px.intake.submit(request("evt-1", "Pista", 1)).await.unwrap();
    let payload = px.channel.drain().await[0].to_bytes().unwrap();

    let first = px.settlement.process(&payload).await.unwrap();
    let second = px.settlement.process(&payload).await.unwrap();

    assert!(matches!(first, Outcome::Settled(_)));
    assert!(matches!(second, Outcome::Duplicate(_)));

    // Exactly one RESERVED record, inventory decremented exactly once.
    assert_eq!(px.ledger.len().await, 1);
    let order = px.ledger.find(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Reserved);

    let snapshot = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.remaining, 9);
}

#[tokio::test]
async fn cancellation_scenario() {
    // Order O2: quantity 3 on Camarote; cancel restores exactly 3 and a
    // second cancel is an illegal transition.
    let px = pipeline(event("evt-1", "Camarote", 500.0, 8)).await;

    let order_id = px
        .intake
        .submit(request("evt-1", "Camarote", 3))
        .await
        .unwrap();

    let before = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.category("Camarote").unwrap().remaining, 5);

    let cancelled = px.intake.cancel(&order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let after = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.category("Camarote").unwrap().remaining, 8);

    let err = px.intake.cancel(&order_id).await.unwrap_err();
    assert!(matches!(err, SalesError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn conservation_under_repeated_reserve_cancel_cycles() {
    let px = pipeline(event("evt-1", "Pista", 100.0, 7)).await;

    for _ in 0..10 {
        let order_id = px.intake.submit(request("evt-1", "Pista", 7)).await.unwrap();
        px.intake.cancel(&order_id).await.unwrap();
    }

    let snapshot = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.remaining, 7);
    assert_eq!(snapshot.category("Pista").unwrap().remaining, 7);
    assert_eq!(snapshot.status, EventStatus::Active);
}

#[tokio::test]
async fn settled_orders_keep_their_decrement_after_duplicate_and_cancel_mix() {
    let px = pipeline(event("evt-1", "Pista", 100.0, 10)).await;

    let keep = px.intake.submit(request("evt-1", "Pista", 2)).await.unwrap();
    let drop = px.intake.submit(request("evt-1", "Pista", 3)).await.unwrap();

    for intent in px.channel.drain().await {
        let payload = intent.to_bytes().unwrap();
        px.settlement.process(&payload).await.unwrap();
    }

    px.intake.cancel(&drop).await.unwrap();
    px.intake.confirm(&keep).await.unwrap();

    let snapshot = px
        .inventory
        .find(&EventId::from("evt-1"))
        .await
        .unwrap()
        .unwrap();
    // 10 - 2 (kept, paid) = 8: the cancelled 3 came back.
    assert_eq!(snapshot.remaining, 8);

    let kept = px.ledger.find(&keep).await.unwrap().unwrap();
    assert_eq!(kept.status, OrderStatus::Paid);
}

#[tokio::test]
async fn state_machine_legality_is_enforced_end_to_end() {
    let px = pipeline(event("evt-1", "Pista", 100.0, 10)).await;

    let order_id = px.intake.submit(request("evt-1", "Pista", 1)).await.unwrap();

    // RESERVED -> PAID is legal once.
    px.intake.confirm(&order_id).await.unwrap();

    // PAID -> CANCELLED and PAID -> PAID are not.
    assert!(matches!(
        px.intake.cancel(&order_id).await.unwrap_err(),
        SalesError::InvalidStateTransition {
            from: OrderStatus::Paid,
            ..
        }
    ));
    assert!(matches!(
        px.intake.confirm(&order_id).await.unwrap_err(),
        SalesError::InvalidStateTransition { .. }
    ));
}

#[tokio::test]
async fn rejected_messages_leave_no_ledger_effects() {
    let px = pipeline(event("evt-1", "Pista", 100.0, 10)).await;

    let order_id = px.intake.submit(request("evt-1", "Pista", 1)).await.unwrap();
    let mut intent: PurchaseIntent = px.channel.drain().await.remove(0);

    // Tamper with the amount: the worker must refuse to settle it.
    intent.total = 1.0;
    let outcome = px
        .settlement
        .process(&intent.to_bytes().unwrap())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Rejected { .. }));

    let order = px.ledger.find(&order_id).await.unwrap().unwrap();
    assert!(order.settled_at.is_none());
}

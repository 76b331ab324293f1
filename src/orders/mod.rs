//! Domain model for ticket sales.
//!
//! Identifiers are opaque newtypes; raw strings exist only at the wire
//! and store boundaries. The order state machine is enforced here and by
//! conditional updates in the ledger stores.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod intent;

pub use intent::PurchaseIntent;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// The raw string form, for store filters and wire fields.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }
    };
}

id_type!(
    /// Order identifier; doubles as the idempotency key for fulfillment.
    OrderId
);
id_type!(
    /// Event identifier.
    EventId
);
id_type!(
    /// Buyer identifier; the sales ledger is partitioned by it.
    BuyerId
);

impl OrderId {
    /// Generate a fresh order id for a new purchase.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Lifecycle status of an event's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Accepting reservations.
    Active,
    /// Sales suspended by event management.
    Paused,
    /// Aggregate remaining count reached zero.
    SoldOut,
}

impl EventStatus {
    /// Canonical string form used in stored documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "ACTIVE",
            EventStatus::Paused => "PAUSED",
            EventStatus::SoldOut => "SOLD_OUT",
        }
    }

    /// Parse the canonical string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(EventStatus::Active),
            "PAUSED" => Some(EventStatus::Paused),
            "SOLD_OUT" => Some(EventStatus::SoldOut),
            _ => None,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ticket category inside an event, with its own price and stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCategory {
    /// Category name (e.g. "Pista", "Camarote").
    pub name: String,
    /// Full (non-discounted) unit price.
    pub unit_price: f64,
    /// Remaining availability in this category.
    pub remaining: u32,
}

/// Inventory record for one event.
///
/// Counts are mutated only through the atomic conditional updates on
/// `InventoryStore`; this struct is a read snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event identifier.
    pub id: EventId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Aggregate remaining availability across categories.
    pub remaining: u32,
    /// Ticket categories.
    pub categories: Vec<TicketCategory>,
}

impl EventRecord {
    /// Look up a category by name.
    pub fn category(&self, name: &str) -> Option<&TicketCategory> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Buyer record, as resolved from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Buyer identifier.
    pub id: BuyerId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Entitlement kind carried on a purchase: full price or half price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketKind {
    /// Full-price ticket.
    Inteira,
    /// Half-price entitlement (students, seniors, ...).
    Meia,
}

impl TicketKind {
    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Inteira => "INTEIRA",
            TicketKind::Meia => "MEIA",
        }
    }

    /// Parse the canonical string form. Unknown kinds are rejected, not
    /// defaulted.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INTEIRA" => Some(TicketKind::Inteira),
            "MEIA" => Some(TicketKind::Meia),
            _ => None,
        }
    }

    /// Effective unit price for this entitlement kind.
    pub fn unit_price(&self, full_price: f64) -> f64 {
        match self {
            TicketKind::Inteira => full_price,
            TicketKind::Meia => full_price / 2.0,
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted but not yet reserved.
    Pending,
    /// Inventory decremented, awaiting payment.
    Reserved,
    /// Payment confirmed. Terminal.
    Paid,
    /// Cancelled; reserved stock was released. Terminal.
    Cancelled,
    /// Reservation predicate failed; no stock held. Terminal.
    ErrorStock,
}

impl OrderStatus {
    /// Canonical string form used in stored documents and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::ErrorStock => "ERROR_STOCK",
        }
    }

    /// Parse the canonical string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(OrderStatus::Pending),
            "RESERVED" => Some(OrderStatus::Reserved),
            "PAID" => Some(OrderStatus::Paid),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "ERROR_STOCK" => Some(OrderStatus::ErrorStock),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Cancelled | OrderStatus::ErrorStock
        )
    }

    /// Legal forward transitions. Records only move forward; terminal
    /// states admit nothing.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Reserved)
                | (OrderStatus::Pending, OrderStatus::ErrorStock)
                | (OrderStatus::Reserved, OrderStatus::Paid)
                | (OrderStatus::Reserved, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reservation/order record in the sales ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketOrder {
    /// Order id; unique ledger key.
    pub id: OrderId,
    /// Event being purchased.
    pub event_id: EventId,
    /// Purchasing buyer.
    pub buyer_id: BuyerId,
    /// Category name within the event.
    pub category: String,
    /// Number of tickets.
    pub quantity: u32,
    /// Entitlement kind.
    pub kind: TicketKind,
    /// Unit price after the entitlement modifier.
    pub unit_price: f64,
    /// quantity x unit_price.
    pub total: f64,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// When the order was accepted.
    pub created_at: DateTime<Utc>,
    /// Set once the settlement worker has processed the order; the
    /// conditional update on this field is the settlement idempotency
    /// claim.
    pub settled_at: Option<DateTime<Utc>>,
}

impl TicketOrder {
    /// Expected total for the recorded quantity and unit price.
    pub fn expected_total(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

//! Purchase-intent message carried on the order queue.
//!
//! The JSON schema is fixed: every field is required and validated, so a
//! message missing a field is rejected at parse time instead of being
//! silently defaulted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BuyerId, EventId, OrderId, OrderStatus, TicketKind, TicketOrder};

/// Tolerance when comparing monetary totals computed independently.
const TOTAL_EPSILON: f64 = 0.005;

/// Immutable fulfillment message, correlated 1:1 with a ledger record by
/// order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    /// Order id (idempotency key).
    #[serde(rename = "pedido_id")]
    pub order_id: OrderId,
    /// Event reference.
    #[serde(rename = "evento_id")]
    pub event_id: EventId,
    /// Buyer reference.
    #[serde(rename = "usuario_id")]
    pub buyer_id: BuyerId,
    /// Number of tickets; must be positive.
    #[serde(rename = "quantidade")]
    pub quantity: u32,
    /// Category name within the event.
    #[serde(rename = "categoria")]
    pub category: String,
    /// Entitlement kind.
    #[serde(rename = "tipo_ingresso")]
    pub kind: TicketKind,
    /// Unit price after the entitlement modifier.
    #[serde(rename = "valor_unitario")]
    pub unit_price: f64,
    /// quantity x unit_price, computed by the producer.
    #[serde(rename = "valor_total")]
    pub total: f64,
    /// Order status at publish time.
    pub status: OrderStatus,
    /// Publish timestamp, RFC 3339.
    #[serde(rename = "data_hora")]
    pub created_at: DateTime<Utc>,
}

impl PurchaseIntent {
    /// Build the intent for a freshly reserved order.
    pub fn from_order(order: &TicketOrder) -> Self {
        Self {
            order_id: order.id.clone(),
            event_id: order.event_id.clone(),
            buyer_id: order.buyer_id.clone(),
            quantity: order.quantity,
            category: order.category.clone(),
            kind: order.kind,
            unit_price: order.unit_price,
            total: order.total,
            status: order.status,
            created_at: order.created_at,
        }
    }

    /// Parse and validate a raw queue payload.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect when the payload is not valid
    /// JSON, misses a required field, or violates a field constraint.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, String> {
        let intent: PurchaseIntent =
            serde_json::from_slice(payload).map_err(|e| e.to_string())?;
        intent.validate()?;
        Ok(intent)
    }

    /// Serialize for publishing.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot fail for well-formed intents.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Field constraints beyond JSON well-formedness.
    fn validate(&self) -> Result<(), String> {
        if self.order_id.as_str().is_empty() {
            return Err("pedido_id must not be empty".to_string());
        }
        if self.event_id.as_str().is_empty() {
            return Err("evento_id must not be empty".to_string());
        }
        if self.buyer_id.as_str().is_empty() {
            return Err("usuario_id must not be empty".to_string());
        }
        if self.category.is_empty() {
            return Err("categoria must not be empty".to_string());
        }
        if self.quantity == 0 {
            return Err("quantidade must be positive".to_string());
        }
        if self.unit_price < 0.0 || self.total < 0.0 {
            return Err("prices must not be negative".to_string());
        }
        Ok(())
    }

    /// Whether the carried total matches quantity x unit price.
    pub fn total_consistent(&self) -> bool {
        (self.total - f64::from(self.quantity) * self.unit_price).abs() < TOTAL_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "pedido_id": "ord-1",
            "evento_id": "evt-1",
            "usuario_id": "user-1",
            "quantidade": 2,
            "categoria": "Pista",
            "tipo_ingresso": "MEIA",
            "valor_unitario": 150.0,
            "valor_total": 300.0,
            "status": "RESERVED",
            "data_hora": "2024-11-02T18:30:00Z"
        })
    }

    #[test]
    fn parses_canonical_payload() {
        let bytes = serde_json::to_vec(&sample_json()).unwrap();
        let intent = PurchaseIntent::from_bytes(&bytes).unwrap();

        assert_eq!(intent.order_id.as_str(), "ord-1");
        assert_eq!(intent.quantity, 2);
        assert_eq!(intent.kind, TicketKind::Meia);
        assert_eq!(intent.status, OrderStatus::Reserved);
        assert!(intent.total_consistent());
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("quantidade");
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(PurchaseIntent::from_bytes(&bytes).is_err());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut value = sample_json();
        value["quantidade"] = serde_json::json!(0);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(PurchaseIntent::from_bytes(&bytes).is_err());
    }

    #[test]
    fn unknown_ticket_kind_is_rejected() {
        let mut value = sample_json();
        value["tipo_ingresso"] = serde_json::json!("CORTESIA");
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(PurchaseIntent::from_bytes(&bytes).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PurchaseIntent::from_bytes(b"not json at all").is_err());
    }

    #[test]
    fn wire_field_names_are_stable() {
        let bytes = serde_json::to_vec(&sample_json()).unwrap();
        let intent = PurchaseIntent::from_bytes(&bytes).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&intent.to_bytes().unwrap()).unwrap();

        for field in [
            "pedido_id",
            "evento_id",
            "usuario_id",
            "quantidade",
            "categoria",
            "tipo_ingresso",
            "valor_unitario",
            "valor_total",
            "status",
            "data_hora",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn detects_total_drift() {
        let mut value = sample_json();
        value["valor_total"] = serde_json::json!(9999.0);
        let bytes = serde_json::to_vec(&value).unwrap();
        let intent = PurchaseIntent::from_bytes(&bytes).unwrap();

        assert!(!intent.total_consistent());
    }
}

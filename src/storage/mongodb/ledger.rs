//! MongoDB SalesLedger implementation.
//!
//! The order id is the collection `_id`, so the idempotency key is
//! enforced by the store itself (duplicate inserts fail with code
//! 11000). Status changes and the settlement claim are conditional
//! updates: predicate and write happen in one step, which is what keeps
//! redeliveries and concurrent worker replicas down to a single effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};

use crate::interfaces::{Result, SalesLedger, StorageError};
use crate::orders::{BuyerId, EventId, OrderId, OrderStatus, TicketKind, TicketOrder};

use super::SALES_COLLECTION;

/// MongoDB implementation of SalesLedger.
pub struct MongoSalesLedger {
    sales: Collection<Document>,
}

impl MongoSalesLedger {
    /// Create a new MongoDB sales ledger.
    ///
    /// # Errors
    ///
    /// Fails when index creation fails.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let sales = client.database(database_name).collection(SALES_COLLECTION);

        let store = Self { sales };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        // Hashed index on the buyer id: the ledger is partitioned by
        // buyer, so per-buyer writes land on different shards.
        let buyer_index = IndexModel::builder()
            .keys(doc! { "usuario_id": "hashed" })
            .build();
        self.sales.create_index(buyer_index).await?;

        // Reaper scan: reserved orders ordered by creation time.
        let stale_index = IndexModel::builder()
            .keys(doc! { "status": 1, "data_hora": 1 })
            .options(IndexOptions::builder().build())
            .build();
        self.sales.create_index(stale_index).await?;

        Ok(())
    }
}

#[async_trait]
impl SalesLedger for MongoSalesLedger {
    async fn insert(&self, order: &TicketOrder) -> Result<()> {
        self.sales
            .insert_one(order_to_document(order))
            .await
            .map_err(|e| {
                if let mongodb::error::ErrorKind::Write(
                    mongodb::error::WriteFailure::WriteError(ref write_err),
                ) = *e.kind
                {
                    if write_err.code == 11000 {
                        return StorageError::DuplicateKey(order.id.to_string());
                    }
                }
                StorageError::from(e)
            })?;
        Ok(())
    }

    async fn find(&self, id: &OrderId) -> Result<Option<TicketOrder>> {
        let doc = self.sales.find_one(doc! { "_id": id.as_str() }).await?;
        doc.map(|d| order_from_document(&d)).transpose()
    }

    async fn transition(
        &self,
        id: &OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<TicketOrder>> {
        let from_states: Vec<&str> = from.iter().map(OrderStatus::as_str).collect();

        let filter = doc! {
            "_id": id.as_str(),
            "status": { "$in": from_states },
        };
        let update = doc! { "$set": { "status": to.as_str() } };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .sales
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;

        updated.map(|d| order_from_document(&d)).transpose()
    }

    async fn claim_settlement(&self, id: &OrderId, at: DateTime<Utc>) -> Result<bool> {
        let filter = doc! {
            "_id": id.as_str(),
            "status": OrderStatus::Reserved.as_str(),
            "settled_at": { "$exists": false },
        };
        let update = doc! { "$set": { "settled_at": at.to_rfc3339() } };

        let claimed = self.sales.find_one_and_update(filter, update).await?;
        Ok(claimed.is_some())
    }

    async fn stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<Vec<TicketOrder>> {
        let filter = doc! {
            "status": OrderStatus::Reserved.as_str(),
            "data_hora": { "$lt": cutoff.to_rfc3339() },
        };

        let mut cursor = self.sales.find(filter).await?;

        let mut orders = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            orders.push(order_from_document(&doc)?);
        }

        Ok(orders)
    }
}

fn order_to_document(order: &TicketOrder) -> Document {
    let mut doc = doc! {
        "_id": order.id.as_str(),
        "evento_id": order.event_id.as_str(),
        "usuario_id": order.buyer_id.as_str(),
        "categoria": &order.category,
        "quantidade": i64::from(order.quantity),
        "tipo_ingresso": order.kind.as_str(),
        "valor_unitario": order.unit_price,
        "valor_total": order.total,
        "status": order.status.as_str(),
        "data_hora": order.created_at.to_rfc3339(),
    };
    if let Some(at) = order.settled_at {
        doc.insert("settled_at", at.to_rfc3339());
    }
    doc
}

fn order_from_document(doc: &Document) -> Result<TicketOrder> {
    let malformed = |field: &str| StorageError::MalformedDocument(format!("order.{}", field));

    let parse_timestamp = |raw: &str, field: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| malformed(field))
    };

    let settled_at = match doc.get_str("settled_at") {
        Ok(raw) => Some(parse_timestamp(raw, "settled_at")?),
        Err(_) => None,
    };

    Ok(TicketOrder {
        id: OrderId::from(doc.get_str("_id").map_err(|_| malformed("_id"))?),
        event_id: EventId::from(
            doc.get_str("evento_id").map_err(|_| malformed("evento_id"))?,
        ),
        buyer_id: BuyerId::from(
            doc.get_str("usuario_id")
                .map_err(|_| malformed("usuario_id"))?,
        ),
        category: doc
            .get_str("categoria")
            .map_err(|_| malformed("categoria"))?
            .to_string(),
        quantity: u32::try_from(
            doc.get_i64("quantidade")
                .map_err(|_| malformed("quantidade"))?,
        )
        .map_err(|_| malformed("quantidade"))?,
        kind: doc
            .get_str("tipo_ingresso")
            .ok()
            .and_then(TicketKind::parse)
            .ok_or_else(|| malformed("tipo_ingresso"))?,
        unit_price: doc
            .get_f64("valor_unitario")
            .map_err(|_| malformed("valor_unitario"))?,
        total: doc
            .get_f64("valor_total")
            .map_err(|_| malformed("valor_total"))?,
        status: doc
            .get_str("status")
            .ok()
            .and_then(OrderStatus::parse)
            .ok_or_else(|| malformed("status"))?,
        created_at: parse_timestamp(
            doc.get_str("data_hora").map_err(|_| malformed("data_hora"))?,
            "data_hora",
        )?,
        settled_at,
    })
}

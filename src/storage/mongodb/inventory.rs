//! MongoDB InventoryStore implementation.
//!
//! All count mutation goes through `find_one_and_update` with the
//! reservation predicate in the filter, so the store evaluates predicate
//! and mutation as one indivisible step. Concurrent reservations against
//! the same event serialize on the document; no caller-side locking.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Client, Collection};

use crate::interfaces::{InventoryStore, Result, StorageError};
use crate::orders::{EventId, EventRecord, EventStatus, TicketCategory};

use super::EVENTS_COLLECTION;

/// MongoDB implementation of InventoryStore.
pub struct MongoInventoryStore {
    events: Collection<Document>,
}

impl MongoInventoryStore {
    /// Create a new MongoDB inventory store.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond driver construction; kept fallible to
    /// match the other stores' index-creating constructors.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let events = client.database(database_name).collection(EVENTS_COLLECTION);
        Ok(Self { events })
    }

    /// Flip ACTIVE -> SOLD_OUT once the aggregate count drains to zero.
    ///
    /// Advisory only: the reserve predicate alone enforces correctness,
    /// so losing this race to a concurrent release is benign.
    async fn mark_sold_out(&self, id: &EventId) -> Result<bool> {
        let result = self
            .events
            .update_one(
                doc! {
                    "_id": id.as_str(),
                    "status": EventStatus::Active.as_str(),
                    "restante": 0_i64,
                },
                doc! { "$set": { "status": EventStatus::SoldOut.as_str() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    /// Flip SOLD_OUT -> ACTIVE after a release restored availability.
    async fn reactivate(&self, id: &EventId) -> Result<bool> {
        let result = self
            .events
            .update_one(
                doc! {
                    "_id": id.as_str(),
                    "status": EventStatus::SoldOut.as_str(),
                    "restante": { "$gt": 0_i64 },
                },
                doc! { "$set": { "status": EventStatus::Active.as_str() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}

#[async_trait]
impl InventoryStore for MongoInventoryStore {
    async fn insert(&self, event: &EventRecord) -> Result<()> {
        self.events
            .insert_one(event_to_document(event))
            .await
            .map_err(map_duplicate(event.id.as_str()))?;
        Ok(())
    }

    async fn find(&self, id: &EventId) -> Result<Option<EventRecord>> {
        let doc = self.events.find_one(doc! { "_id": id.as_str() }).await?;
        doc.map(|d| event_from_document(&d)).transpose()
    }

    async fn reserve(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>> {
        let qty = i64::from(quantity);

        let filter = doc! {
            "_id": id.as_str(),
            "status": EventStatus::Active.as_str(),
            "restante": { "$gte": qty },
            "categorias": {
                "$elemMatch": { "nome": category, "restante": { "$gte": qty } }
            },
        };
        let update = doc! {
            "$inc": { "restante": -qty, "categorias.$.restante": -qty }
        };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .events
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;

        match updated {
            Some(doc) => {
                let mut record = event_from_document(&doc)?;
                if record.remaining == 0 && self.mark_sold_out(id).await? {
                    record.status = EventStatus::SoldOut;
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn release(
        &self,
        id: &EventId,
        category: &str,
        quantity: u32,
    ) -> Result<Option<EventRecord>> {
        let qty = i64::from(quantity);

        let filter = doc! {
            "_id": id.as_str(),
            "categorias": { "$elemMatch": { "nome": category } },
        };
        let update = doc! {
            "$inc": { "restante": qty, "categorias.$.restante": qty }
        };

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .events
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;

        match updated {
            Some(doc) => {
                let mut record = event_from_document(&doc)?;
                if record.remaining > 0 && self.reactivate(id).await? {
                    record.status = EventStatus::Active;
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Map a duplicate-key write error (code 11000) to `DuplicateKey`.
fn map_duplicate(id: &str) -> impl FnOnce(mongodb::error::Error) -> StorageError + '_ {
    move |e| {
        if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(
            ref write_err,
        )) = *e.kind
        {
            if write_err.code == 11000 {
                return StorageError::DuplicateKey(id.to_string());
            }
        }
        StorageError::from(e)
    }
}

fn event_to_document(event: &EventRecord) -> Document {
    let categories: Vec<Bson> = event
        .categories
        .iter()
        .map(|c| {
            Bson::Document(doc! {
                "nome": &c.name,
                "preco_unitario": c.unit_price,
                "restante": i64::from(c.remaining),
            })
        })
        .collect();

    doc! {
        "_id": event.id.as_str(),
        "nome": &event.name,
        "status": event.status.as_str(),
        "restante": i64::from(event.remaining),
        "categorias": categories,
    }
}

fn event_from_document(doc: &Document) -> Result<EventRecord> {
    let malformed = |field: &str| StorageError::MalformedDocument(format!("event.{}", field));

    let id = doc.get_str("_id").map_err(|_| malformed("_id"))?;
    let name = doc.get_str("nome").map_err(|_| malformed("nome"))?;
    let status_raw = doc.get_str("status").map_err(|_| malformed("status"))?;
    let status = EventStatus::parse(status_raw).ok_or_else(|| malformed("status"))?;
    let remaining = doc.get_i64("restante").map_err(|_| malformed("restante"))?;

    let mut categories = Vec::new();
    for entry in doc
        .get_array("categorias")
        .map_err(|_| malformed("categorias"))?
    {
        let cat = entry
            .as_document()
            .ok_or_else(|| malformed("categorias"))?;
        categories.push(TicketCategory {
            name: cat
                .get_str("nome")
                .map_err(|_| malformed("categorias.nome"))?
                .to_string(),
            unit_price: cat
                .get_f64("preco_unitario")
                .map_err(|_| malformed("categorias.preco_unitario"))?,
            remaining: u32::try_from(
                cat.get_i64("restante")
                    .map_err(|_| malformed("categorias.restante"))?,
            )
            .map_err(|_| malformed("categorias.restante"))?,
        });
    }

    Ok(EventRecord {
        id: EventId::from(id),
        name: name.to_string(),
        status,
        remaining: u32::try_from(remaining).map_err(|_| malformed("restante"))?,
        categories,
    })
}

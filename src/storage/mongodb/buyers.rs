//! MongoDB BuyerDirectory implementation.
//!
//! Thin boundary adapter over the user collection maintained by external
//! user management; the pipeline only resolves references through it.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};

use crate::interfaces::{BuyerDirectory, Result, StorageError};
use crate::orders::{Buyer, BuyerId};

use super::USERS_COLLECTION;

/// MongoDB implementation of BuyerDirectory.
pub struct MongoBuyerDirectory {
    users: Collection<Document>,
}

impl MongoBuyerDirectory {
    /// Create a new MongoDB buyer directory.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond driver construction; kept fallible to
    /// match the other stores' constructors.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let users = client.database(database_name).collection(USERS_COLLECTION);
        Ok(Self { users })
    }
}

#[async_trait]
impl BuyerDirectory for MongoBuyerDirectory {
    async fn insert(&self, buyer: &Buyer) -> Result<()> {
        self.users
            .insert_one(doc! {
                "_id": buyer.id.as_str(),
                "nome": &buyer.name,
                "email": &buyer.email,
            })
            .await?;
        Ok(())
    }

    async fn find(&self, id: &BuyerId) -> Result<Option<Buyer>> {
        let doc = self.users.find_one(doc! { "_id": id.as_str() }).await?;

        doc.map(|d| {
            let malformed =
                |field: &str| StorageError::MalformedDocument(format!("buyer.{}", field));
            Ok(Buyer {
                id: BuyerId::from(d.get_str("_id").map_err(|_| malformed("_id"))?),
                name: d.get_str("nome").map_err(|_| malformed("nome"))?.to_string(),
                email: d
                    .get_str("email")
                    .map_err(|_| malformed("email"))?
                    .to_string(),
            })
        })
        .transpose()
    }
}

//! MongoDB handler: CRUD, index, and introspection primitives for the
//! `reviews` collection.
//!
//! The driver pools connections internally, so the persistent and pooled
//! policies both keep one `Client` (pooled caps `max_pool_size`); ephemeral
//! builds a fresh client per call.

use bson::oid::ObjectId;
use bson::{doc, to_document, Document};
use futures::stream::TryStreamExt;
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tokio::sync::Mutex;

use super::connection::ConnectionPolicy;
use super::{TxAbort, BULK_SCORE_INCREMENT, TX_SCORE_INCREMENT, TX_SCORE_THRESHOLD};
use crate::config::DatabaseConfig;
use crate::data::Review;
use crate::error::HandlerError;

pub const REVIEWS_COLLECTION: &str = "reviews";

pub struct MongoHandler {
    config: DatabaseConfig,
    policy: ConnectionPolicy,
    shared: Mutex<Option<Client>>,
}

impl MongoHandler {
    pub fn new(config: DatabaseConfig, policy: ConnectionPolicy) -> Self {
        MongoHandler {
            config,
            policy,
            shared: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    async fn build_client(&self) -> Result<Client, HandlerError> {
        let mut options = ClientOptions::parse(self.config.mongo_uri()).await?;
        if let ConnectionPolicy::Pooled { size } = self.policy {
            options.max_pool_size = Some(size.max(1) as u32);
        }
        Ok(Client::with_options(options)?)
    }

    async fn acquire(&self) -> Result<Client, HandlerError> {
        match self.policy {
            ConnectionPolicy::Ephemeral => self.build_client().await,
            ConnectionPolicy::Persistent | ConnectionPolicy::Pooled { .. } => {
                let mut slot = self.shared.lock().await;
                if let Some(client) = slot.as_ref() {
                    return Ok(client.clone());
                }
                let client = self.build_client().await?;
                *slot = Some(client.clone());
                Ok(client)
            }
        }
    }

    fn reviews(&self, client: &Client) -> Collection<Document> {
        client
            .database(&self.config.database)
            .collection(REVIEWS_COLLECTION)
    }

    /// Close the held client. The next call reconnects.
    pub async fn close(&self) {
        if let Some(client) = self.shared.lock().await.take() {
            client.shutdown().await;
        }
    }

    /// Drop and recreate the target database with an empty `reviews`
    /// collection. Destructive, no confirmation. The collection is created
    /// explicitly so transactions can run against it right away.
    pub async fn create_database(&self) -> Result<(), HandlerError> {
        let client = self.acquire().await?;
        let db = client.database(&self.config.database);
        if client
            .list_database_names(None, None)
            .await?
            .contains(&self.config.database)
        {
            db.drop(None).await?;
            log::info!("database '{}' dropped", self.config.database);
        }
        db.create_collection(REVIEWS_COLLECTION, None).await?;
        log::info!("database '{}' created", self.config.database);
        Ok(())
    }

    /// Drop the `reviews` collection if present and recreate it empty.
    pub async fn initialize_collection(&self) -> Result<(), HandlerError> {
        let client = self.acquire().await?;
        let db = client.database(&self.config.database);
        if db
            .list_collection_names(None)
            .await?
            .iter()
            .any(|name| name == REVIEWS_COLLECTION)
        {
            self.reviews(&client).drop(None).await?;
        }
        db.create_collection(REVIEWS_COLLECTION, None).await?;
        Ok(())
    }

    pub async fn insert_one(&self, review: &Review) -> Result<(), HandlerError> {
        let client = self.acquire().await?;
        let doc = to_document(review)?;
        self.reviews(&client).insert_one(doc, None).await?;
        Ok(())
    }

    /// Insert a batch as one `insertMany`. Returns the count of documents
    /// the server acknowledged, never the attempted count.
    pub async fn insert_many(&self, reviews: &[Review]) -> Result<u64, HandlerError> {
        if reviews.is_empty() {
            return Ok(0);
        }
        let docs: Vec<Document> = reviews
            .iter()
            .map(to_document)
            .collect::<Result<_, _>>()?;
        let client = self.acquire().await?;
        let result = self.reviews(&client).insert_many(docs, None).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    /// Apply the fixed score increment to one document. Returns the
    /// modified count.
    pub async fn update_one(&self, id: ObjectId) -> Result<u64, HandlerError> {
        let client = self.acquire().await?;
        let result = self
            .reviews(&client)
            .update_one(
                doc! { "_id": id },
                doc! { "$inc": { "score": BULK_SCORE_INCREMENT } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    /// One `updateMany` over the whole ID batch via `$in`.
    pub async fn update_many_bulk(&self, ids: &[ObjectId]) -> Result<u64, HandlerError> {
        let client = self.acquire().await?;
        let result = self
            .reviews(&client)
            .update_many(
                doc! { "_id": { "$in": ids.to_vec() } },
                doc! { "$inc": { "score": BULK_SCORE_INCREMENT } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    pub async fn delete_one(&self, id: ObjectId) -> Result<u64, HandlerError> {
        let client = self.acquire().await?;
        let result = self
            .reviews(&client)
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    pub async fn delete_many_bulk(&self, ids: &[ObjectId]) -> Result<u64, HandlerError> {
        let client = self.acquire().await?;
        let result = self
            .reviews(&client)
            .delete_many(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?;
        Ok(result.deleted_count)
    }

    /// Equality scan on one field, materialized in memory.
    pub async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Review>, HandlerError> {
        let client = self.acquire().await?;
        let mut cursor = self.reviews(&client).find(doc! { field: value }, None).await?;
        let mut reviews = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            reviews.push(bson::from_document(doc)?);
        }
        Ok(reviews)
    }

    pub async fn create_single_field_index(&self, field: &str) -> Result<(), HandlerError> {
        let client = self.acquire().await?;
        let model = IndexModel::builder().keys(doc! { field: 1 }).build();
        self.reviews(&client).create_index(model, None).await?;
        Ok(())
    }

    pub async fn create_compound_index(&self, fields: &[&str]) -> Result<(), HandlerError> {
        let mut keys = Document::new();
        for field in fields {
            keys.insert(field.to_string(), 1);
        }
        let client = self.acquire().await?;
        let model = IndexModel::builder().keys(keys).build();
        self.reviews(&client).create_index(model, None).await?;
        Ok(())
    }

    pub async fn is_empty(&self) -> Result<bool, HandlerError> {
        Ok(self.count_reviews().await? == 0)
    }

    pub async fn count_reviews(&self) -> Result<u64, HandlerError> {
        let client = self.acquire().await?;
        Ok(self.reviews(&client).count_documents(None, None).await?)
    }

    /// Full `_id` scan, materialized in memory.
    pub async fn get_all_ids(&self) -> Result<Vec<ObjectId>, HandlerError> {
        let client = self.acquire().await?;
        let options = FindOptions::builder().projection(doc! { "_id": 1 }).build();
        let mut cursor = self.reviews(&client).find(None, options).await?;
        let mut ids = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            ids.push(doc.get_object_id("_id")?);
        }
        Ok(ids)
    }

    pub async fn get_review_by_id(&self, id: ObjectId) -> Result<Option<Review>, HandlerError> {
        let client = self.acquire().await?;
        let doc = self
            .reviews(&client)
            .find_one(doc! { "_id": id }, None)
            .await?;
        doc.map(bson::from_document).transpose().map_err(Into::into)
    }

    /// Run the transactional scenario in a session transaction: batch
    /// insert, then a per-document score bump for documents at or above the
    /// threshold. Returns true on commit, false when the simulated error
    /// forced an abort. Requires a replica-set or sharded deployment.
    pub async fn run_transaction(
        &self,
        reviews: &[Review],
        simulate_error: bool,
    ) -> Result<bool, HandlerError> {
        let client = self.acquire().await?;
        let mut session = client.start_session(None).await?;
        session.start_transaction(None).await?;

        let collection = self.reviews(&client);
        match transaction_body(&collection, &mut session, reviews, simulate_error).await {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(true)
            }
            Err(TxAbort::Simulated) => {
                session.abort_transaction().await?;
                log::warn!(
                    "transaction failed: simulated error for rollback test; aborted changes"
                );
                Ok(false)
            }
            Err(TxAbort::Handler(e)) => {
                let _ = session.abort_transaction().await;
                Err(e)
            }
        }
    }
}

async fn transaction_body(
    collection: &Collection<Document>,
    session: &mut ClientSession,
    reviews: &[Review],
    simulate_error: bool,
) -> Result<(), TxAbort> {
    for review in reviews {
        let doc = to_document(review)?;
        collection.insert_one_with_session(doc, None, session).await?;
    }

    let filter = doc! { "score": { "$gte": TX_SCORE_THRESHOLD } };
    let mut cursor = collection
        .find_with_session(filter, None, session)
        .await?;
    let mut ids = Vec::new();
    while let Some(doc) = cursor.next(session).await {
        ids.push(doc?.get_object_id("_id")?);
    }

    for id in ids {
        collection
            .update_one_with_session(
                doc! { "_id": id },
                doc! { "$inc": { "score": TX_SCORE_INCREMENT } },
                None,
                session,
            )
            .await?;
    }

    if simulate_error {
        return Err(TxAbort::Simulated);
    }
    Ok(())
}

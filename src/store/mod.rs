// Document store seam: the procedures only see this trait, backends live in submodules.

mod mongo;
mod order;
mod sqlite;

pub use mongo::MongoStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use serde::Serialize;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A collection as reported by `list_collections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub capped: bool,
}

/// The CRUD surface the procedures need. Missing collections behave like MongoDB:
/// reads return nothing, inserts create the collection, drops are no-ops.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Database (or file) the handle points at.
    fn database(&self) -> &str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Returns the number of inserted documents.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError>;

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Fails when `to` already exists.
    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// `$set` one field on every document whose `_id` equals `id`. Returns the matched count.
    async fn set_field(
        &self,
        collection: &str,
        id: &Bson,
        field: &str,
        value: Bson,
    ) -> Result<u64, StoreError>;

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_collections()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }
}

/// Open the configured backend and check it answers.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Mongodb => Arc::new(MongoStore::connect(&config.uri, &config.database).await?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::connect(&config.uri).await?),
    };
    store.ping().await?;
    tracing::info!(
        backend = store.backend(),
        database = store.database(),
        "document store connected"
    );
    Ok(store)
}

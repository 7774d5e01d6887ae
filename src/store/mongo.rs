// MongoDB backend (official driver). One client per run; the driver pools internally.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::instrument;

use super::{CollectionSummary, DocumentStore, SortOrder};
use crate::error::StoreError;
use crate::version::NAME;

pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Parse the URI and build the client. The driver connects lazily; call `ping` to check reachability.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let mut opts = ClientOptions::parse(uri).await?;
        opts.app_name = Some(NAME.to_string());
        let client = Client::with_options(opts)?;
        let db = client.database(database);
        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn database(&self) -> &str {
        self.db.name()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        let specs: Vec<_> = self.db.list_collections().await?.try_collect().await?;
        let mut out: Vec<CollectionSummary> = specs
            .into_iter()
            .map(|spec| CollectionSummary {
                capped: spec.options.capped.unwrap_or(false),
                name: spec.name,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self.collection(collection).count_documents(doc! {}).await?)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .collection(collection)
            .find(doc! {})
            .await?
            .try_collect()
            .await?;
        Ok(docs)
    }

    #[instrument(skip(self), fields(backend = "mongodb"))]
    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut sort = Document::new();
        sort.insert(
            field,
            match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            },
        );
        let coll = self.collection(collection);
        let mut find = coll.find(doc! {}).sort(sort);
        if let Some(limit) = limit {
            find = find.limit(i64::from(limit));
        }
        let docs = find.await?.try_collect().await?;
        Ok(docs)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let result = self.collection(collection).insert_many(docs).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collection(collection).drop().await?;
        Ok(())
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let db = self.db.name();
        self.client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{db}.{from}"),
                "to": format!("{db}.{to}"),
                "dropTarget": false,
            })
            .await?;
        Ok(())
    }

    async fn set_field(
        &self,
        collection: &str,
        id: &Bson,
        field: &str,
        value: Bson,
    ) -> Result<u64, StoreError> {
        let mut set = Document::new();
        set.insert(field, value);
        let result = self
            .collection(collection)
            .update_many(doc! { "_id": id.clone() }, doc! { "$set": set })
            .await?;
        Ok(result.matched_count)
    }
}

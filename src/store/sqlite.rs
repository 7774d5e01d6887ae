// Local SQLite backend: one table per collection, documents stored as BSON blobs.
// Table layout: doc_id TEXT PRIMARY KEY (canonical extended JSON of `_id`), body BLOB.
// Insertion order is rowid order; sorted reads decode and sort in process.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use super::order::compare;
use super::{CollectionSummary, DocumentStore, SortOrder};
use crate::error::StoreError;

pub struct SqliteStore {
    pool: SqlitePool,
    path: String,
}

/// Quote a collection name for use as a table identifier.
fn table(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Stable string key for an `_id` value.
fn id_key(id: &Bson) -> String {
    id.clone().into_relaxed_extjson().to_string()
}

fn encode(doc: &Document) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    doc.to_writer(&mut out)?;
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<Document, StoreError> {
    Ok(Document::from_reader(&mut &bytes[..])?)
}

impl SqliteStore {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self {
            pool,
            path: path.to_string(),
        })
    }

    async fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn ensure_table(&self, collection: &str) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (doc_id TEXT PRIMARY KEY, body BLOB NOT NULL)",
            table(collection)
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn database(&self) -> &str {
        &self.path
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(CollectionSummary {
                name: row.try_get("name")?,
                capped: false,
            });
        }
        Ok(out)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        if !self.exists(collection).await? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) AS n FROM {}", table(collection));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        if !self.exists(collection).await? {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT body FROM {} ORDER BY rowid", table(collection));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let body: Vec<u8> = row.try_get("body")?;
            out.push(decode(&body)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.find_all(collection).await?;
        match order {
            SortOrder::Ascending => docs.sort_by(|a, b| compare(a.get(field), b.get(field))),
            SortOrder::Descending => {
                docs.sort_by(|a, b| compare(b.get(field), a.get(field)))
            }
        }
        if let Some(limit) = limit {
            docs.truncate(limit as usize);
        }
        Ok(docs)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError> {
        if docs.is_empty() {
            return Ok(0);
        }
        self.ensure_table(collection).await?;
        let sql = format!(
            "INSERT INTO {} (doc_id, body) VALUES ($1, $2)",
            table(collection)
        );
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id", ObjectId::new());
            }
            let key = doc.get("_id").map(id_key).unwrap_or_default();
            sqlx::query(&sql)
                .bind(&key)
                .bind(encode(&doc)?)
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let sql = format!("DROP TABLE IF EXISTS {}", table(collection));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let sql = format!("ALTER TABLE {} RENAME TO {}", table(from), table(to));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_field(
        &self,
        collection: &str,
        id: &Bson,
        field: &str,
        value: Bson,
    ) -> Result<u64, StoreError> {
        if !self.exists(collection).await? {
            return Ok(0);
        }
        let key = id_key(id);
        let select = format!("SELECT body FROM {} WHERE doc_id = $1", table(collection));
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query(&select)
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(0);
        };
        let body: Vec<u8> = row.try_get("body")?;
        let mut doc = decode(&body)?;
        doc.insert(field, value);
        let update = format!("UPDATE {} SET body = $1 WHERE doc_id = $2", table(collection));
        sqlx::query(&update)
            .bind(encode(&doc)?)
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(1)
    }
}

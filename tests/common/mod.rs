// Shared test helpers
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mongodb::bson::{Bson, DateTime, Document, doc};
use sensor_ops::error::{ModelError, StoreError};
use sensor_ops::forecast::{FeatureFormula, Forecaster, Scaler};
use sensor_ops::store::{CollectionSummary, DocumentStore, SortOrder, SqliteStore};
use tempfile::TempDir;

pub const READINGS: &str = "SensorKelompok8";
pub const READINGS_TEMP: &str = "SensorKelompok8_Temp";

pub const BASE_TS_MS: i64 = 1_700_000_000_000;

pub async fn temp_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sensor.db");
    let store = SqliteStore::connect(path.to_str().unwrap()).await.unwrap();
    (dir, store)
}

/// Create a collection with no documents in the store opened by `temp_store`.
pub async fn create_empty_collection(dir: &TempDir, name: &str) {
    let url = format!("sqlite:{}", dir.path().join("sensor.db").display());
    let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query(&format!(
        "CREATE TABLE \"{name}\" (doc_id TEXT PRIMARY KEY, body BLOB NOT NULL)"
    ))
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;
}

pub fn temperature(i: usize) -> f64 {
    25.0 + (i % 7) as f64 * 0.5
}

pub fn humidity(i: usize) -> f64 {
    60.0 + (i % 5) as f64
}

/// Reading `i` is one minute after reading `i - 1`.
pub fn reading(i: usize) -> Document {
    doc! {
        "_id": format!("r{i:03}"),
        "timestamp": DateTime::from_millis(BASE_TS_MS + i as i64 * 60_000),
        "temp": temperature(i),
        "hum": humidity(i),
    }
}

pub fn readings(n: usize) -> Vec<Document> {
    (0..n).map(reading).collect()
}

pub fn feature(i: usize) -> f64 {
    FeatureFormula::ScaledProduct.apply(temperature(i), humidity(i))
}

pub fn test_scaler() -> Scaler {
    Scaler::MinMax {
        data_min: 20.0,
        data_max: 50.0,
        feature_range: (0.0, 1.0),
    }
}

/// Predicts the mean of the window. With an affine scaler the forecast is the mean raw feature.
pub struct MeanForecaster {
    pub input_length: Option<usize>,
}

impl Forecaster for MeanForecaster {
    fn input_length(&self) -> Option<usize> {
        self.input_length
    }

    fn predict(&self, window: &[f64]) -> Result<f64, ModelError> {
        Ok(window.iter().sum::<f64>() / window.len() as f64)
    }
}

pub fn write_json(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// Wraps a SqliteStore, records mutating operations and can fail one of them.
/// Collection listings are counted separately and fail with `fail_on = Some("list")`.
pub struct RecordingStore {
    pub inner: SqliteStore,
    pub ops: Mutex<Vec<&'static str>>,
    pub fail_on: Option<&'static str>,
    pub listings: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: SqliteStore, fail_on: Option<&'static str>) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            fail_on,
            listings: AtomicUsize::new(0),
        }
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn fail(&self, op: &'static str) -> Result<(), StoreError> {
        if self.fail_on == Some(op) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "injected {op} failure"
            ))));
        }
        Ok(())
    }

    fn record(&self, op: &'static str) -> Result<(), StoreError> {
        self.ops.lock().unwrap().push(op);
        self.fail(op)
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    fn backend(&self) -> &'static str {
        "recording"
    }

    fn database(&self) -> &str {
        self.inner.database()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.fail("list")?;
        self.inner.list_collections().await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.inner.count(collection).await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.inner.find_all(collection).await
    }

    async fn find_sorted(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<Document>, StoreError> {
        self.inner.find_sorted(collection, field, order, limit).await
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, StoreError> {
        self.record("insert")?;
        self.inner.insert_many(collection, docs).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.record("drop")?;
        self.inner.drop_collection(collection).await
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.record("rename")?;
        self.inner.rename_collection(from, to).await
    }

    async fn set_field(
        &self,
        collection: &str,
        id: &Bson,
        field: &str,
        value: Bson,
    ) -> Result<u64, StoreError> {
        self.record("update")?;
        self.inner.set_field(collection, id, field, value).await
    }
}

// Store inspection: what the configured connection actually sees.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::OpsError;
use crate::store::{CollectionSummary, DocumentStore};

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub backend: &'static str,
    pub database: String,
    pub collections: Vec<CollectionSummary>,
    /// Document count of the readings collection, None when it does not exist.
    pub readings_count: Option<u64>,
}

pub async fn inspect(
    store: &dyn DocumentStore,
    readings_collection: &str,
) -> Result<InspectReport, OpsError> {
    let collections = store
        .list_collections()
        .await
        .map_err(|e| OpsError::storage("list collections", readings_collection, e))?;
    let readings_count = if collections.iter().any(|c| c.name == readings_collection) {
        Some(
            store
                .count(readings_collection)
                .await
                .map_err(|e| OpsError::storage("count", readings_collection, e))?,
        )
    } else {
        None
    };
    Ok(InspectReport {
        backend: store.backend(),
        database: store.database().to_string(),
        collections,
        readings_count,
    })
}

/// Print the report as log lines.
pub fn log_report(report: &InspectReport, readings_collection: &str) {
    info!(backend = report.backend, database = %report.database, "connected");
    if report.collections.is_empty() {
        warn!("no collections, the database is empty");
    }
    for c in &report.collections {
        info!(
            name = %c.name,
            kind = if c.capped { "capped" } else { "standard" },
            "collection"
        );
    }
    match report.readings_count {
        Some(n) => info!(collection = readings_collection, documents = n, "readings collection"),
        None => warn!(
            collection = readings_collection,
            "readings collection does not exist in this database; check the connection string and store.database"
        ),
    }
}

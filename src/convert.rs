// Collection converter: copy a capped collection into a staging collection, drop the source,
// rename the copy back. Not atomic; each step checks where a previous failed run stopped.

use std::collections::HashSet;

use mongodb::bson::Document;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::OpsError;
use crate::store::{CollectionSummary, DocumentStore};

#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub collection: String,
    pub temp_collection: String,
}

impl ConvertSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            collection: config.collections.readings.clone(),
            temp_collection: config.collections.temp_collection(),
        }
    }
}

/// Where the source and staging collections stand before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Source present, no staging copy.
    Fresh,
    /// Source and staging copy both present: a previous run stopped before the drop, or the
    /// source was recreated after a failed rename.
    StaleTemp,
    /// Only the staging copy is present: a previous run stopped after the drop.
    AwaitingRename,
    /// Neither exists.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ConvertOutcome {
    Converted { documents: u64 },
    /// Only the final rename was needed.
    Resumed { documents: u64 },
}

pub async fn detect_state(
    store: &dyn DocumentStore,
    settings: &ConvertSettings,
) -> Result<MigrationState, OpsError> {
    Ok(survey(store, settings).await?.0)
}

/// Migration state plus the source's collection summary, from a single listing.
async fn survey(
    store: &dyn DocumentStore,
    settings: &ConvertSettings,
) -> Result<(MigrationState, Option<CollectionSummary>), OpsError> {
    let collections = store
        .list_collections()
        .await
        .map_err(|e| OpsError::storage("list collections", &settings.collection, e))?;
    let source = collections
        .iter()
        .find(|c| c.name == settings.collection)
        .cloned();
    let temp = collections.iter().any(|c| c.name == settings.temp_collection);
    let state = match (source.is_some(), temp) {
        (true, false) => MigrationState::Fresh,
        (true, true) => MigrationState::StaleTemp,
        (false, true) => MigrationState::AwaitingRename,
        (false, false) => MigrationState::Missing,
    };
    Ok((state, source))
}

/// `_id`s in `staged` that `source` does not have.
fn missing_from_source(source: &[Document], staged: &[Document]) -> usize {
    let key = |d: &Document| d.get("_id").map(|id| id.clone().into_relaxed_extjson().to_string());
    let present: HashSet<Option<String>> = source.iter().map(key).collect();
    staged.iter().filter(|d| !present.contains(&key(d))).count()
}

#[instrument(skip_all, fields(collection = %settings.collection, temp = %settings.temp_collection))]
pub async fn convert_collection(
    store: &dyn DocumentStore,
    settings: &ConvertSettings,
) -> Result<ConvertOutcome, OpsError> {
    let source = settings.collection.as_str();
    let temp = settings.temp_collection.as_str();

    let (state, summary) = survey(store, settings).await?;
    info!(?state, "migration state");
    match state {
        MigrationState::Missing => return Err(OpsError::EmptyCollection(source.to_string())),
        MigrationState::AwaitingRename => {
            warn!("source is gone but the staging copy exists, resuming at rename");
            let documents = store
                .count(temp)
                .await
                .map_err(|e| OpsError::storage("count", temp, e))?;
            rename_back(store, temp, source).await?;
            return Ok(ConvertOutcome::Resumed { documents });
        }
        MigrationState::Fresh | MigrationState::StaleTemp => {}
    }

    if let Some(summary) = &summary {
        info!(capped = summary.capped, "source collection");
    }

    info!("reading source documents");
    let docs = store
        .find_all(source)
        .await
        .map_err(|e| OpsError::storage("find", source, e))?;
    let expected = docs.len() as u64;
    info!(documents = expected, "source read");
    if docs.is_empty() {
        return Err(OpsError::EmptyCollection(source.to_string()));
    }

    if state == MigrationState::StaleTemp {
        // After a failed rename a new insert recreates the source; the staging copy is then
        // the only full history.
        let staged = store
            .find_all(temp)
            .await
            .map_err(|e| OpsError::storage("find", temp, e))?;
        let missing = missing_from_source(&docs, &staged);
        if missing > 0 {
            error!(
                "'{}' holds {} documents missing from '{}'; it may be the only copy of that history. \
                 Merge them into '{}' (or drop '{}' if they are not needed), then re-run convert",
                temp, missing, source, source, temp
            );
            return Err(OpsError::StagingConflict {
                collection: temp.to_string(),
                missing,
            });
        }
        warn!("dropping staging copy left by a previous run");
        store
            .drop_collection(temp)
            .await
            .map_err(|e| OpsError::storage("drop", temp, e))?;
    }
    store
        .insert_many(temp, docs)
        .await
        .map_err(|e| OpsError::storage("insert", temp, e))?;
    let copied = store
        .count(temp)
        .await
        .map_err(|e| OpsError::storage("count", temp, e))?;
    if copied != expected {
        return Err(OpsError::CopyVerification {
            collection: temp.to_string(),
            expected,
            found: copied,
        });
    }
    info!(documents = copied, "copied to staging collection");

    if let Err(e) = store.drop_collection(source).await {
        error!(
            "drop of '{}' failed; its data is also in '{}'. Drop '{}' manually, then re-run convert to finish",
            source, temp, source
        );
        return Err(OpsError::storage("drop", source, e));
    }
    info!("source collection dropped");

    rename_back(store, temp, source).await?;
    Ok(ConvertOutcome::Converted { documents: copied })
}

async fn rename_back(store: &dyn DocumentStore, temp: &str, source: &str) -> Result<(), OpsError> {
    if let Err(e) = store.rename_collection(temp, source).await {
        error!(
            "rename failed; data is safe in '{}'. Re-run convert to resume, or rename it to '{}' manually",
            temp, source
        );
        return Err(OpsError::storage("rename", temp, e));
    }
    info!("staging collection renamed back, conversion complete");
    Ok(())
}

// Forecast backfill: walk historical readings in time order, predict each reading's THI from
// the window before it, and write the prediction back onto the reading.
// Sequential: each update is acknowledged before the next prediction.

use mongodb::bson::Bson;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{AppConfig, FieldNames};
use crate::error::{ArtifactError, OpsError};
use crate::forecast::{FeatureFormula, FeatureSequence, Forecaster, Scaler};
use crate::models::id_string;
use crate::store::{DocumentStore, SortOrder};

#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub collection: String,
    pub fields: FieldNames,
    pub window_length: usize,
    pub progress_every: usize,
    /// Compute forecasts without writing them.
    pub dry_run: bool,
}

impl BackfillSettings {
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Self {
        Self {
            collection: config.collections.readings.clone(),
            fields: config.fields.clone(),
            window_length: config.forecast.window_length,
            progress_every: config.forecast.progress_every,
            dry_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub id: String,
    /// Index of the reading in time order.
    pub position: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub rejected_records: usize,
    pub windows: usize,
    /// Targets past the first window whose window would include a rejected reading.
    pub skipped_targets: usize,
    pub updated: usize,
    /// Updates whose `_id` matched no document.
    pub unmatched: usize,
    pub forecasts: Vec<Forecast>,
}

/// Run one backfill pass. Any store or model error aborts; forecasts already written stay.
#[instrument(skip_all, fields(collection = %settings.collection, window_length = settings.window_length, dry_run = settings.dry_run))]
pub async fn run_backfill(
    store: &dyn DocumentStore,
    model: &dyn Forecaster,
    scaler: &Scaler,
    formula: FeatureFormula,
    settings: &BackfillSettings,
) -> Result<BackfillReport, OpsError> {
    let window_length = settings.window_length;
    let collection = settings.collection.as_str();

    if let Some(expected) = model.input_length()
        && expected != window_length
    {
        return Err(ArtifactError::WindowMismatch {
            model: expected,
            configured: window_length,
        }
        .into());
    }

    info!("fetching readings sorted by time");
    let docs = store
        .find_sorted(
            collection,
            &settings.fields.timestamp,
            SortOrder::Ascending,
            None,
        )
        .await
        .map_err(|e| OpsError::storage("find", collection, e))?;
    if docs.len() <= window_length {
        return Err(OpsError::InsufficientData {
            found: docs.len(),
            window_length,
        });
    }
    info!(records = docs.len(), %formula, "processing readings");

    let sequence = FeatureSequence::partition(&docs, &settings.fields, formula);
    for r in &sequence.rejected {
        debug!(
            position = r.position,
            id = %r.id.as_ref().map(id_string).unwrap_or_default(),
            reason = %r.reason,
            "reading rejected"
        );
    }
    if !sequence.rejected.is_empty() {
        warn!(
            rejected = sequence.rejected.len(),
            "readings without usable temperature/humidity excluded"
        );
    }
    if sequence.valid.len() <= window_length {
        return Err(OpsError::InsufficientData {
            found: sequence.valid.len(),
            window_length,
        });
    }

    let normalized: Vec<f64> = sequence
        .valid
        .iter()
        .map(|p| scaler.transform(p.value))
        .collect();
    let windows = sequence.windows(window_length);

    let mut report = BackfillReport {
        total_records: docs.len(),
        valid_records: sequence.valid.len(),
        rejected_records: sequence.rejected.len(),
        windows: windows.len(),
        skipped_targets: sequence.skipped_targets(window_length),
        ..Default::default()
    };
    if report.skipped_targets > 0 {
        warn!(
            skipped = report.skipped_targets,
            "targets skipped: their window would span a rejected reading"
        );
    }

    info!(windows = windows.len(), "starting batch prediction");
    for window in &windows {
        let target = &sequence.valid[window.target];
        let predicted = model
            .predict(&normalized[window.inputs.clone()])
            .map_err(|cause| OpsError::Prediction {
                position: target.position,
                cause,
            })?;
        let value = scaler.inverse(predicted);
        report.forecasts.push(Forecast {
            id: id_string(&target.id),
            position: target.position,
            value,
        });
        if settings.dry_run {
            continue;
        }

        let matched = store
            .set_field(
                collection,
                &target.id,
                &settings.fields.forecast,
                Bson::Double(value),
            )
            .await
            .map_err(|e| OpsError::storage("update", collection, e))?;
        match matched {
            0 => {
                report.unmatched += 1;
                warn!(id = %id_string(&target.id), "update matched no document");
                continue;
            }
            1 => {}
            n => warn!(id = %id_string(&target.id), matched = n, "duplicate _id, several documents updated"),
        }
        report.updated += 1;
        if report.updated % settings.progress_every == 0 {
            info!(updated = report.updated, "progress");
        }
    }

    info!(
        updated = report.updated,
        forecasts = report.forecasts.len(),
        unmatched = report.unmatched,
        "backfill complete"
    );
    Ok(report)
}

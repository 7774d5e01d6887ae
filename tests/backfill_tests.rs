// Forecast backfill over a SQLite document store: window counts, alignment, idempotence

mod common;

use approx::assert_relative_eq;
use common::*;
use mongodb::bson::doc;
use sensor_ops::backfill::{BackfillSettings, run_backfill};
use sensor_ops::config::FieldNames;
use sensor_ops::error::OpsError;
use sensor_ops::forecast::FeatureFormula;
use sensor_ops::models::numeric_field;
use sensor_ops::store::DocumentStore;

fn settings(window_length: usize, dry_run: bool) -> BackfillSettings {
    BackfillSettings {
        collection: READINGS.into(),
        fields: FieldNames::default(),
        window_length,
        progress_every: 2,
        dry_run,
    }
}

async fn forecast_of(store: &dyn DocumentStore, id: &str) -> Option<f64> {
    let docs = store.find_all(READINGS).await.unwrap();
    let doc = docs
        .iter()
        .find(|d| d.get_str("_id").ok() == Some(id))
        .unwrap();
    numeric_field(doc, "thi_forecast").ok()
}

#[tokio::test]
async fn backfill_35_readings_window_30_writes_5_forecasts() {
    let (_dir, store) = temp_store().await;
    // Inserted newest first; backfill must order by timestamp.
    let mut docs = readings(35);
    docs.reverse();
    store.insert_many(READINGS, docs).await.unwrap();

    let model = MeanForecaster { input_length: None };
    let report = run_backfill(
        &store,
        &model,
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap();

    assert_eq!(report.total_records, 35);
    assert_eq!(report.valid_records, 35);
    assert_eq!(report.windows, 5);
    assert_eq!(report.updated, 5);
    assert_eq!(report.unmatched, 0);
    assert_eq!(report.skipped_targets, 0);

    for i in 0..30 {
        assert!(forecast_of(&store, &format!("r{i:03}")).await.is_none());
    }
    for i in 30..35 {
        let expected = (i - 30..i).map(feature).sum::<f64>() / 30.0;
        let got = forecast_of(&store, &format!("r{i:03}")).await.unwrap();
        assert_relative_eq!(got, expected, epsilon = 1e-9);
    }
    let positions: Vec<usize> = report.forecasts.iter().map(|f| f.position).collect();
    assert_eq!(positions, vec![30, 31, 32, 33, 34]);
}

#[tokio::test]
async fn backfill_updates_n_minus_window_readings() {
    let (_dir, store) = temp_store().await;
    store.insert_many(READINGS, readings(50)).await.unwrap();

    let report = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(10, false),
    )
    .await
    .unwrap();

    assert_eq!(report.updated, 40);
    assert_eq!(store.count(READINGS).await.unwrap(), 50);
}

#[tokio::test]
async fn backfill_with_too_few_readings_is_insufficient_data() {
    let (_dir, store) = temp_store().await;
    store.insert_many(READINGS, readings(30)).await.unwrap();

    let err = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        OpsError::InsufficientData {
            found: 30,
            window_length: 30
        }
    ));
    for i in 0..30 {
        assert!(forecast_of(&store, &format!("r{i:03}")).await.is_none());
    }
}

#[tokio::test]
async fn backfill_on_missing_collection_is_insufficient_data() {
    let (_dir, store) = temp_store().await;
    let err = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OpsError::InsufficientData { found: 0, .. }));
}

#[tokio::test]
async fn backfill_skips_windows_spanning_a_rejected_reading() {
    let (_dir, store) = temp_store().await;
    let mut docs = readings(40);
    docs[2].insert("temp", "n/a");
    store.insert_many(READINGS, docs).await.unwrap();

    let report = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap();

    assert_eq!(report.valid_records, 39);
    assert_eq!(report.rejected_records, 1);
    assert_eq!(report.skipped_targets, 2);
    assert_eq!(report.updated, 7);

    assert!(forecast_of(&store, "r002").await.is_none());
    assert!(forecast_of(&store, "r031").await.is_none());
    assert!(forecast_of(&store, "r032").await.is_none());
    for i in 33..40 {
        let expected = (i - 30..i).map(feature).sum::<f64>() / 30.0;
        let got = forecast_of(&store, &format!("r{i:03}")).await.unwrap();
        assert_relative_eq!(got, expected, epsilon = 1e-9);
    }
}

#[tokio::test]
async fn backfill_twice_gives_identical_forecasts() {
    let (_dir, store) = temp_store().await;
    store.insert_many(READINGS, readings(36)).await.unwrap();
    let model = MeanForecaster { input_length: None };
    let scaler = test_scaler();

    let first = run_backfill(
        &store,
        &model,
        &scaler,
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap();
    let second = run_backfill(
        &store,
        &model,
        &scaler,
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap();

    assert_eq!(first.forecasts, second.forecasts);
    assert_eq!(second.updated, 6);
    assert_eq!(store.count(READINGS).await.unwrap(), 36);
}

#[tokio::test]
async fn backfill_dry_run_writes_nothing() {
    let (_dir, inner) = temp_store().await;
    inner.insert_many(READINGS, readings(33)).await.unwrap();
    let store = RecordingStore::new(inner, None);

    let report = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, true),
    )
    .await
    .unwrap();

    assert_eq!(report.forecasts.len(), 3);
    assert_eq!(report.updated, 0);
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn backfill_rejects_model_with_other_window_length() {
    let (_dir, store) = temp_store().await;
    store.insert_many(READINGS, readings(35)).await.unwrap();

    let err = run_backfill(
        &store,
        &MeanForecaster {
            input_length: Some(10),
        },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OpsError::ArtifactLoad(_)));
}

#[tokio::test]
async fn backfill_aborts_on_update_failure() {
    let (_dir, inner) = temp_store().await;
    inner.insert_many(READINGS, readings(32)).await.unwrap();
    let store = RecordingStore::new(inner, Some("update"));

    let err = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &settings(30, false),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        OpsError::StorageOperation {
            operation: "update",
            ..
        }
    ));
    // Fail-fast: no further updates after the first failure.
    assert_eq!(store.ops(), vec!["update"]);
}

#[tokio::test]
async fn backfill_honours_custom_field_names() {
    let (_dir, store) = temp_store().await;
    let docs: Vec<_> = (0..12)
        .map(|i| {
            doc! {
                "_id": i as i64,
                "ts": i as i64 * 1000,
                "temperature": temperature(i),
                "humidity": humidity(i),
            }
        })
        .collect();
    store.insert_many(READINGS, docs).await.unwrap();

    let mut s = settings(10, false);
    s.fields = FieldNames {
        timestamp: "ts".into(),
        temperature: "temperature".into(),
        humidity: "humidity".into(),
        forecast: "predicted".into(),
    };
    let report = run_backfill(
        &store,
        &MeanForecaster { input_length: None },
        &test_scaler(),
        FeatureFormula::ScaledProduct,
        &s,
    )
    .await
    .unwrap();
    assert_eq!(report.updated, 2);

    let docs = store.find_all(READINGS).await.unwrap();
    let with_forecast = docs.iter().filter(|d| d.contains_key("predicted")).count();
    assert_eq!(with_forecast, 2);
}

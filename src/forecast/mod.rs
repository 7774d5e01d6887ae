// Forecast inputs: feature engineering, normalization and the sequence model.

mod features;
mod lstm;
mod scaler;

pub use features::{
    FeatureFormula, FeaturePoint, FeatureSequence, RejectReason, Rejection, Window,
};
pub use lstm::{Activation, LstmModel};
pub use scaler::Scaler;

use crate::config::ForecastConfig;
use crate::error::{ArtifactError, ModelError};

/// Maps one normalized window to one normalized prediction.
pub trait Forecaster: Send + Sync {
    /// Window length the model was trained on, when known.
    fn input_length(&self) -> Option<usize>;

    fn predict(&self, window: &[f64]) -> Result<f64, ModelError>;
}

/// Everything backfill needs from disk, checked against the config.
#[derive(Debug)]
pub struct ForecastArtifacts {
    pub model: LstmModel,
    pub scaler: Scaler,
    pub formula: FeatureFormula,
}

impl ForecastArtifacts {
    pub fn load(config: &ForecastConfig) -> Result<Self, ArtifactError> {
        let model = LstmModel::load(&config.model_path)?;
        let scaler = Scaler::load(&config.scaler_path)?;
        if let Some(expected) = model.input_length()
            && expected != config.window_length
        {
            return Err(ArtifactError::WindowMismatch {
                model: expected,
                configured: config.window_length,
            });
        }
        let formula = resolve_formula(model.feature_formula(), config.feature_formula)?;
        Ok(Self {
            model,
            scaler,
            formula,
        })
    }
}

/// The formula must be declared by the model export or the config; both must agree if both do.
pub fn resolve_formula(
    artifact: Option<FeatureFormula>,
    config: Option<FeatureFormula>,
) -> Result<FeatureFormula, ArtifactError> {
    match (artifact, config) {
        (Some(a), Some(c)) if a != c => Err(ArtifactError::FormulaConflict {
            artifact: a.to_string(),
            config: c.to_string(),
        }),
        (Some(f), _) | (None, Some(f)) => Ok(f),
        (None, None) => Err(ArtifactError::FormulaUndeclared),
    }
}

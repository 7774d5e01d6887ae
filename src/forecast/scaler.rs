// Feature normalization fitted at training time. Loaded from JSON, never fitted here.
//
// {"kind": "min_max", "data_min": 20.1, "data_max": 38.7, "feature_range": [0, 1]}
// {"kind": "standard", "mean": 27.3, "scale": 3.9}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

fn unit_range() -> (f64, f64) {
    (0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    MinMax {
        data_min: f64,
        data_max: f64,
        #[serde(default = "unit_range")]
        feature_range: (f64, f64),
    },
    Standard {
        mean: f64,
        scale: f64,
    },
}

/// Zero spread maps to 1 so constant training data does not divide by zero.
fn nonzero(v: f64) -> f64 {
    if v == 0.0 { 1.0 } else { v }
}

impl Scaler {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let s = std::fs::read_to_string(path).map_err(|error| ArtifactError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let scaler: Scaler = serde_json::from_str(&s).map_err(|error| ArtifactError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        scaler.validate().map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(scaler)
    }

    pub fn validate(&self) -> Result<(), String> {
        let params: Vec<f64> = match self {
            Self::MinMax {
                data_min,
                data_max,
                feature_range,
            } => {
                if data_max < data_min {
                    return Err(format!("data_max {data_max} < data_min {data_min}"));
                }
                if feature_range.1 <= feature_range.0 {
                    return Err(format!("empty feature_range {feature_range:?}"));
                }
                vec![*data_min, *data_max, feature_range.0, feature_range.1]
            }
            Self::Standard { mean, scale } => vec![*mean, *scale],
        };
        if params.iter().all(|p| p.is_finite()) {
            Ok(())
        } else {
            Err("non-finite parameter".into())
        }
    }

    /// (multiplier, offset) so that `transform(x) = x * multiplier + offset`.
    fn affine(&self) -> (f64, f64) {
        match self {
            Self::MinMax {
                data_min,
                data_max,
                feature_range,
            } => {
                let scale = (feature_range.1 - feature_range.0) / nonzero(data_max - data_min);
                (scale, feature_range.0 - data_min * scale)
            }
            Self::Standard { mean, scale } => {
                let scale = nonzero(*scale);
                (1.0 / scale, -mean / scale)
            }
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        let (m, b) = self.affine();
        value * m + b
    }

    pub fn inverse(&self, value: f64) -> f64 {
        let (m, b) = self.affine();
        (value - b) / m
    }
}

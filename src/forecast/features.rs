// Feature engineering: readings -> THI feature sequence, partitioned into valid and rejected.
// Valid points keep their chronological position so windows never straddle a rejected reading.

use std::fmt;
use std::ops::Range;

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::config::FieldNames;
use crate::models::{FieldError, numeric_field};

/// How the THI feature is derived from temperature and humidity.
/// Must match the formula the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFormula {
    /// `0.8*t + (h*t)/500`
    ScaledProduct,
    /// `0.8*t + (h/100)*(t - 14.4) + 46.4`
    Classic,
}

impl FeatureFormula {
    pub fn apply(self, temperature: f64, humidity: f64) -> f64 {
        match self {
            Self::ScaledProduct => 0.8 * temperature + (humidity * temperature) / 500.0,
            Self::Classic => 0.8 * temperature + (humidity / 100.0) * (temperature - 14.4) + 46.4,
        }
    }
}

impl fmt::Display for FeatureFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ScaledProduct => "scaled_product",
            Self::Classic => "classic",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePoint {
    /// Index of the reading in the time-ordered input.
    pub position: usize,
    pub id: Bson,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    MissingId,
    Field { field: String, error: FieldError },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing _id"),
            Self::Field { field, error } => write!(f, "{field}: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub position: usize,
    pub id: Option<Bson>,
    pub reason: RejectReason,
}

/// One model input: `inputs` indexes `valid`, `target` is the valid index being forecast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub inputs: Range<usize>,
    pub target: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureSequence {
    pub valid: Vec<FeaturePoint>,
    pub rejected: Vec<Rejection>,
}

impl FeatureSequence {
    /// Compute the feature for every document, in input order.
    pub fn partition(docs: &[Document], fields: &FieldNames, formula: FeatureFormula) -> Self {
        let mut out = Self::default();
        for (position, doc) in docs.iter().enumerate() {
            let id = doc.get("_id").cloned();
            match read_point(doc, fields) {
                Ok((t, h)) => match id {
                    Some(id) => out.valid.push(FeaturePoint {
                        position,
                        id,
                        value: formula.apply(t, h),
                    }),
                    None => out.rejected.push(Rejection {
                        position,
                        id: None,
                        reason: RejectReason::MissingId,
                    }),
                },
                Err(reason) => out.rejected.push(Rejection {
                    position,
                    id,
                    reason,
                }),
            }
        }
        out
    }

    /// Windows of `window_length` consecutive valid points followed by their target.
    /// A window is formed only if inputs and target are adjacent readings in time order.
    pub fn windows(&self, window_length: usize) -> Vec<Window> {
        if window_length == 0 {
            return Vec::new();
        }
        (window_length..self.valid.len())
            .filter(|&i| self.valid[i].position - self.valid[i - window_length].position == window_length)
            .map(|i| Window {
                inputs: i - window_length..i,
                target: i,
            })
            .collect()
    }

    /// Targets at index >= window_length that `windows` drops because of a gap.
    pub fn skipped_targets(&self, window_length: usize) -> usize {
        self.valid.len().saturating_sub(window_length) - self.windows(window_length).len()
    }
}

fn read_point(doc: &Document, fields: &FieldNames) -> Result<(f64, f64), RejectReason> {
    let field = |name: &str| {
        numeric_field(doc, name).map_err(|error| RejectReason::Field {
            field: name.to_string(),
            error,
        })
    };
    Ok((field(&fields.temperature)?, field(&fields.humidity)?))
}

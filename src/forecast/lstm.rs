// Sequence model: LSTM/Dense forward pass over weights exported from the training notebook.
//
// Layout follows Keras: LSTM kernel is [input_dim, 4*units], recurrent kernel [units, 4*units],
// bias [4*units], gate order i, f, c, o. Dense kernel is [in, out].
// The model reads a [window_length, 1] sequence and must end in a single scalar.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, s};
use serde::Deserialize;

use super::{FeatureFormula, Forecaster};
use crate::error::{ArtifactError, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Tanh,
    Sigmoid,
    /// Keras 2: `clip(0.2x + 0.5, 0, 1)`. Keras 2 exports name it `hard_sigmoid`.
    #[serde(rename = "hard_sigmoid", alias = "hard_sigmoid_keras2")]
    HardSigmoidKeras2,
    /// Keras 3: `relu6(x + 3) / 6`.
    #[serde(rename = "hard_sigmoid_keras3")]
    HardSigmoidKeras3,
    Relu,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Tanh => x.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::HardSigmoidKeras2 => (0.2 * x + 0.5).clamp(0.0, 1.0),
            Self::HardSigmoidKeras3 => (x + 3.0).clamp(0.0, 6.0) / 6.0,
            Self::Relu => x.max(0.0),
        }
    }
}

fn tanh() -> Activation {
    Activation::Tanh
}

fn sigmoid() -> Activation {
    Activation::Sigmoid
}

fn linear() -> Activation {
    Activation::Linear
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    #[serde(default)]
    input_length: Option<usize>,
    #[serde(default)]
    feature_formula: Option<FeatureFormula>,
    layers: Vec<LayerFile>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LayerFile {
    Lstm {
        units: usize,
        kernel: Vec<Vec<f64>>,
        recurrent_kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        return_sequences: bool,
        #[serde(default = "tanh")]
        activation: Activation,
        #[serde(default = "sigmoid")]
        recurrent_activation: Activation,
    },
    Dense {
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default = "linear")]
        activation: Activation,
    },
}

#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
    return_sequences: bool,
    activation: Activation,
    recurrent_activation: Activation,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

/// Output of a layer: a per-timestep sequence or a single vector.
enum Activations {
    Sequence(Array2<f64>),
    Vector(Array1<f64>),
}

impl LstmLayer {
    fn forward(&self, seq: ArrayView2<'_, f64>) -> Activations {
        let u = self.units;
        let gate = self.recurrent_activation;
        let act = self.activation;
        let mut h = Array1::<f64>::zeros(u);
        let mut c = Array1::<f64>::zeros(u);
        let mut hidden = Array2::<f64>::zeros((if self.return_sequences { seq.nrows() } else { 0 }, u));

        for (t, x_t) in seq.rows().into_iter().enumerate() {
            let z = x_t.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;
            let i = z.slice(s![0..u]).mapv(|v| gate.apply(v));
            let f = z.slice(s![u..2 * u]).mapv(|v| gate.apply(v));
            let g = z.slice(s![2 * u..3 * u]).mapv(|v| act.apply(v));
            let o = z.slice(s![3 * u..4 * u]).mapv(|v| gate.apply(v));
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(|v| act.apply(v));
            if self.return_sequences {
                hidden.row_mut(t).assign(&h);
            }
        }

        if self.return_sequences {
            Activations::Sequence(hidden)
        } else {
            Activations::Vector(h)
        }
    }
}

impl DenseLayer {
    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        let act = self.activation;
        (x.dot(&self.kernel) + &self.bias).mapv(|v| act.apply(v))
    }
}

/// Rows of equal length into a [rows, cols] matrix with the expected shape.
fn matrix(name: &str, rows: Vec<Vec<f64>>, shape: (usize, usize)) -> Result<Array2<f64>, String> {
    if rows.len() != shape.0 || rows.iter().any(|r| r.len() != shape.1) {
        return Err(format!(
            "{name}: expected shape [{}, {}], got {} rows of lengths {:?}",
            shape.0,
            shape.1,
            rows.len(),
            rows.iter().map(Vec::len).collect::<Vec<_>>()
        ));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec(shape, flat).map_err(|e| format!("{name}: {e}"))
}

fn vector(name: &str, values: Vec<f64>, len: usize) -> Result<Array1<f64>, String> {
    if values.len() != len {
        return Err(format!("{name}: expected {len} values, got {}", values.len()));
    }
    Ok(Array1::from(values))
}

#[derive(Debug, Clone)]
pub struct LstmModel {
    input_length: Option<usize>,
    feature_formula: Option<FeatureFormula>,
    layers: Vec<Layer>,
}

impl LstmModel {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let s = std::fs::read_to_string(path).map_err(|error| ArtifactError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let file: ModelFile = serde_json::from_str(&s).map_err(|error| ArtifactError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        Self::build(file).map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn build(file: ModelFile) -> Result<Self, String> {
        if file.layers.is_empty() {
            return Err("model has no layers".into());
        }
        if file.input_length == Some(0) {
            return Err("input_length must be > 0".into());
        }

        // Width of the current activations and whether they are still a sequence.
        let mut width = 1usize;
        let mut is_sequence = true;
        let mut layers = Vec::with_capacity(file.layers.len());

        for (n, layer) in file.layers.into_iter().enumerate() {
            match layer {
                LayerFile::Lstm {
                    units,
                    kernel,
                    recurrent_kernel,
                    bias,
                    return_sequences,
                    activation,
                    recurrent_activation,
                } => {
                    if !is_sequence {
                        return Err(format!("layer {n}: lstm needs a sequence input"));
                    }
                    if units == 0 {
                        return Err(format!("layer {n}: lstm units must be > 0"));
                    }
                    let gates = 4 * units;
                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        kernel: matrix(&format!("layer {n} kernel"), kernel, (width, gates))?,
                        recurrent_kernel: matrix(
                            &format!("layer {n} recurrent_kernel"),
                            recurrent_kernel,
                            (units, gates),
                        )?,
                        bias: vector(&format!("layer {n} bias"), bias, gates)?,
                        return_sequences,
                        activation,
                        recurrent_activation,
                    }));
                    width = units;
                    is_sequence = return_sequences;
                }
                LayerFile::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    if is_sequence {
                        return Err(format!(
                            "layer {n}: dense after a sequence output is not supported"
                        ));
                    }
                    let out = kernel.first().map(Vec::len).unwrap_or(0);
                    if out == 0 {
                        return Err(format!("layer {n}: dense kernel is empty"));
                    }
                    layers.push(Layer::Dense(DenseLayer {
                        kernel: matrix(&format!("layer {n} kernel"), kernel, (width, out))?,
                        bias: vector(&format!("layer {n} bias"), bias, out)?,
                        activation,
                    }));
                    width = out;
                }
            }
        }

        if is_sequence || width != 1 {
            return Err(format!(
                "model must end in a single scalar, last layer yields {} {}",
                width,
                if is_sequence { "per timestep" } else { "values" }
            ));
        }

        Ok(Self {
            input_length: file.input_length,
            feature_formula: file.feature_formula,
            layers,
        })
    }

    /// Formula the model was trained on, if the export records it.
    pub fn feature_formula(&self) -> Option<FeatureFormula> {
        self.feature_formula
    }
}

impl Forecaster for LstmModel {
    fn input_length(&self) -> Option<usize> {
        self.input_length
    }

    fn predict(&self, window: &[f64]) -> Result<f64, ModelError> {
        if let Some(expected) = self.input_length
            && window.len() != expected
        {
            return Err(ModelError::WindowLength {
                expected,
                found: window.len(),
            });
        }

        let mut x = Activations::Sequence(Array2::from_shape_fn((window.len(), 1), |(t, _)| {
            window[t]
        }));
        for layer in &self.layers {
            x = match (layer, x) {
                (Layer::Lstm(l), Activations::Sequence(seq)) => l.forward(seq.view()),
                (Layer::Dense(d), Activations::Vector(v)) => Activations::Vector(d.forward(&v)),
                (_, Activations::Sequence(seq)) => return Err(ModelError::OutputShape(seq.len())),
                (_, Activations::Vector(v)) => return Err(ModelError::OutputShape(v.len())),
            };
        }

        let out = match x {
            Activations::Vector(v) if v.len() == 1 => v[0],
            Activations::Vector(v) => return Err(ModelError::OutputShape(v.len())),
            Activations::Sequence(seq) => return Err(ModelError::OutputShape(seq.len())),
        };
        if out.is_finite() {
            Ok(out)
        } else {
            Err(ModelError::NonFinite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_sigmoid_follows_the_exporting_keras_version() {
        let keras2: Activation = serde_json::from_str("\"hard_sigmoid\"").unwrap();
        let keras2_alias: Activation = serde_json::from_str("\"hard_sigmoid_keras2\"").unwrap();
        let keras3: Activation = serde_json::from_str("\"hard_sigmoid_keras3\"").unwrap();
        assert_eq!(keras2, Activation::HardSigmoidKeras2);
        assert_eq!(keras2_alias, Activation::HardSigmoidKeras2);
        assert_eq!(keras3, Activation::HardSigmoidKeras3);

        approx::assert_relative_eq!(keras2.apply(1.0), 0.7, epsilon = 1e-12);
        assert_eq!(keras3.apply(1.0), 4.0 / 6.0);
        assert_eq!(keras2.apply(-3.0), 0.0);
        assert_eq!(keras3.apply(-3.0), 0.0);
        assert_eq!(keras2.apply(2.5), 1.0);
        assert_eq!(keras3.apply(2.5), 5.5 / 6.0);
        assert_eq!(keras3.apply(4.0), 1.0);
    }
}

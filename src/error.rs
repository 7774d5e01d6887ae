// Error taxonomy shared by the procedures. The binary turns these into log lines + exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Failure inside a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("bson encode: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
    #[error("bson decode: {0}")]
    Decode(#[from] mongodb::bson::de::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Model or scaler artifact could not be used.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot read {}: {error}", path.display())]
    Read { path: PathBuf, error: std::io::Error },
    #[error("cannot parse {}: {error}", path.display())]
    Parse {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("invalid artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("model expects windows of {model} values but forecast.window_length is {configured}")]
    WindowMismatch { model: usize, configured: usize },
    #[error("feature formula is not declared by the model artifact or forecast.feature_formula")]
    FormulaUndeclared,
    #[error("feature formula conflict: model artifact declares {artifact}, config declares {config}")]
    FormulaConflict { artifact: String, config: String },
}

/// Inference failure for a single window.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("window has {found} values, model expects {expected}")]
    WindowLength { expected: usize, found: usize },
    #[error("model produced {0} outputs, expected 1")]
    OutputShape(usize),
    #[error("model produced a non-finite value")]
    NonFinite,
}

/// Procedure-level errors. Every variant aborts the run.
/// Messages carry their cause inline; no variant exposes it again as `source()`.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("cannot reach document store: {0}")]
    Connection(StoreError),
    #[error("artifact load failed: {0}")]
    ArtifactLoad(ArtifactError),
    #[error("not enough data: {found} readings, need more than {window_length}")]
    InsufficientData { found: usize, window_length: usize },
    #[error("collection '{0}' is empty, nothing to do")]
    EmptyCollection(String),
    #[error("{operation} on '{collection}' failed: {cause}")]
    StorageOperation {
        operation: &'static str,
        collection: String,
        cause: StoreError,
    },
    #[error("copy verification failed for '{collection}': expected {expected} documents, found {found}")]
    CopyVerification {
        collection: String,
        expected: u64,
        found: u64,
    },
    #[error(
        "staging collection '{collection}' holds {missing} documents missing from the source, refusing to drop it"
    )]
    StagingConflict { collection: String, missing: usize },
    #[error("prediction for reading at position {position} failed: {cause}")]
    Prediction { position: usize, cause: ModelError },
}

impl From<ArtifactError> for OpsError {
    fn from(e: ArtifactError) -> Self {
        Self::ArtifactLoad(e)
    }
}

impl OpsError {
    pub fn storage(operation: &'static str, collection: &str, cause: StoreError) -> Self {
        Self::StorageOperation {
            operation,
            collection: collection.to_string(),
            cause,
        }
    }
}

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::forecast::FeatureFormula;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub fields: FieldNames,
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// MongoDB connection string, or the database file path for sqlite.
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "Sensor".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionsConfig {
    pub readings: String,
    /// Appended to the readings collection name for the converter's staging copy.
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

fn default_temp_suffix() -> String {
    "_Temp".into()
}

impl CollectionsConfig {
    pub fn temp_collection(&self) -> String {
        format!("{}{}", self.readings, self.temp_suffix)
    }
}

/// Document field names of a reading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub timestamp: String,
    pub temperature: String,
    pub humidity: String,
    pub forecast: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".into(),
            temperature: "temp".into(),
            humidity: "hum".into(),
            forecast: "thi_forecast".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_window_length")]
    pub window_length: usize,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    /// Must agree with the model artifact when both declare it.
    #[serde(default)]
    pub feature_formula: Option<FeatureFormula>,
    /// Log a progress line every N updates.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

fn default_window_length() -> usize {
    30
}

fn default_progress_every() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Readings returned by GET /api/readings when no limit is given.
    pub readings_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            readings_limit: 20,
        }
    }
}

/// Upper bound for GET /api/readings?limit=.
pub const MAX_READINGS_LIMIT: u32 = 500;

impl AppConfig {
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.store.uri.is_empty(), "store.uri must be non-empty");
        anyhow::ensure!(
            !self.store.database.is_empty(),
            "store.database must be non-empty"
        );
        anyhow::ensure!(
            !self.collections.readings.is_empty(),
            "collections.readings must be non-empty"
        );
        anyhow::ensure!(
            !self.collections.temp_suffix.is_empty(),
            "collections.temp_suffix must be non-empty"
        );
        for (key, value) in [
            ("fields.timestamp", &self.fields.timestamp),
            ("fields.temperature", &self.fields.temperature),
            ("fields.humidity", &self.fields.humidity),
            ("fields.forecast", &self.fields.forecast),
        ] {
            anyhow::ensure!(!value.is_empty(), "{} must be non-empty", key);
        }
        anyhow::ensure!(
            self.fields.forecast != "_id",
            "fields.forecast must not be _id"
        );
        anyhow::ensure!(
            self.forecast.window_length > 0,
            "forecast.window_length must be > 0, got {}",
            self.forecast.window_length
        );
        anyhow::ensure!(
            self.forecast.progress_every > 0,
            "forecast.progress_every must be > 0, got {}",
            self.forecast.progress_every
        );
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            (1..=MAX_READINGS_LIMIT).contains(&self.server.readings_limit),
            "server.readings_limit must be between 1 and {}, got {}",
            MAX_READINGS_LIMIT,
            self.server.readings_limit
        );
        Ok(())
    }
}

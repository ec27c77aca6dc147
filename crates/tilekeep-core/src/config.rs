// crates/tilekeep-core/src/config.rs

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::RetrySettings;
use crate::error::Result;
use crate::layout::DataLayout;

/// Process configuration. Read from the environment (binaries call
/// `dotenvy::dotenv()` first) or from a TOML file; the defaults suit a local
/// run in the current directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite store file.
    pub database_path: PathBuf,
    /// Root of the archives/tiles/crops directories.
    pub data_dir: PathBuf,
    /// Country-borders GeoJSON for reverse geocoding; when unset, country
    /// resolution falls back to the "unknown" sentinel.
    pub country_borders: Option<PathBuf>,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let defaults = RetrySettings::default();
        Self {
            max_attempts: defaults.max_attempts,
            backoff_ms: defaults.backoff.as_millis() as u64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tilekeep.db"),
            data_dir: PathBuf::from("data"),
            country_borders: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Build from `TILEKEEP_*` environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(value) = env::var("TILEKEEP_DB") {
            config.database_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("TILEKEEP_DATA_DIR") {
            config.data_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("TILEKEEP_COUNTRY_BORDERS") {
            config.country_borders = Some(PathBuf::from(value));
        }
        if let Some(value) = env::var("TILEKEEP_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry.max_attempts = value;
        }
        if let Some(value) = env::var("TILEKEEP_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry.backoff_ms = value;
        }
        config
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Connection URL for the store file; `mode=rwc` creates it on first run.
    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path.display())
    }

    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.retry.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(self.data_dir.clone())
    }
}

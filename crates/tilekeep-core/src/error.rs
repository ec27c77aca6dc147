// crates/tilekeep-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Raised when the bounded retry loop around the store is exhausted.
    /// Distinguishable from query-correctness failures so callers can treat
    /// it as fatal to the whole run.
    #[error("store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Schema bootstrap could not bring the store to the declared layout.
    /// Fatal to process startup.
    #[error("schema bootstrap failed: {0}")]
    SchemaBootstrap(#[source] sqlx::Error),

    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Archive extraction failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Provider operation failed: {0}")]
    Provider(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl PipelineError {
    /// Errors that should terminate the whole run rather than the current
    /// work item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::StoreUnavailable { .. } | PipelineError::SchemaBootstrap(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

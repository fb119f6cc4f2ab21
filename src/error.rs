//! Error types for the dataset loader and the filter engine.

use thiserror::Error;

/// Every failure the loader, the engine and the export layer can report.
///
/// Numeric edge cases (zero targets, single-row groups) are not errors; they
/// produce NaN or "no flag" values instead.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Unsupported file type: {name} (expected .xlsx or .csv)")]
    UnsupportedFormat { name: String },

    #[error("Failed to load {source_name}: {cause:#}")]
    Load {
        source_name: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(#[from] arrow::error::ArrowError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DashboardError {
    pub(crate) fn load(source_name: impl Into<String>, cause: anyhow::Error) -> Self {
        DashboardError::Load {
            source_name: source_name.into(),
            cause,
        }
    }
}

/// Result type alias for labor-pulse operations
pub type Result<T> = std::result::Result<T, DashboardError>;

//! Runtime configuration: default dataset location and chart defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::anomaly::DEFAULT_K;
use crate::data::derive::Granularity;
use crate::error::{DashboardError, Result};

/// Environment variable overriding [`DashboardConfig::default_dataset`].
pub const DATASET_ENV: &str = "LABOR_PULSE_DATASET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// File loaded when the session uses the default data source.
    pub default_dataset: PathBuf,
    /// Band multiplier for anomaly charts.
    pub anomaly_k: f64,
    /// Interval used by time-interval charts.
    pub granularity: Granularity,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            default_dataset: PathBuf::from("data/labor_productivity_sample.csv"),
            anomaly_k: DEFAULT_K,
            granularity: Granularity::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DashboardConfig =
            toml::from_str(text).map_err(|e| DashboardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if given (defaults otherwise), then apply the
    /// environment override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| DashboardError::Config(format!("reading {}: {e}", p.display())))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        if let Ok(dataset) = std::env::var(DATASET_ENV) {
            log::debug!("{DATASET_ENV} overrides default dataset with {dataset}");
            config.default_dataset = PathBuf::from(dataset);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.anomaly_k.is_finite() || self.anomaly_k < 0.0 {
            return Err(DashboardError::Config(format!(
                "anomaly_k must be a finite non-negative number, got {}",
                self.anomaly_k
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DashboardConfig::from_toml_str("granularity = \"week\"").unwrap();
        assert_eq!(cfg.granularity, Granularity::Week);
        assert_eq!(cfg.anomaly_k, DEFAULT_K);
        let defaults = DashboardConfig::default();
        assert_eq!(cfg.default_dataset, defaults.default_dataset);
    }

    #[test]
    fn full_toml() {
        let cfg = DashboardConfig::from_toml_str(
            "default_dataset = \"/srv/labor.xlsx\"\nanomaly_k = 2.0\ngranularity = \"year\"\n",
        )
        .unwrap();
        assert_eq!(cfg.default_dataset, PathBuf::from("/srv/labor.xlsx"));
        assert_eq!(cfg.anomaly_k, 2.0);
        assert_eq!(cfg.granularity, Granularity::Year);
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(
            DashboardConfig::from_toml_str("anomaly_k = -1.0"),
            Err(DashboardError::Config(_))
        ));
        assert!(matches!(
            DashboardConfig::from_toml_str("granularity = \"daily\""),
            Err(DashboardError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DashboardConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}

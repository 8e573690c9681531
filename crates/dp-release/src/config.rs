//! Validation Configuration
//!
//! Tunables for noise calibration and budget enforcement. Every field has a
//! default, so a config file only needs to name what it changes:
//!
//! ```json
//! { "scale_search": { "upper": 5000.0 }, "overflow_policy": "exclude_rejected" }
//! ```

use crate::ledger::MAX_EPSILON_OFFSET;
use crate::search::SearchBounds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Confidence level used when a count or histogram request does not state one
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What happens to the running epsilon total when a request overflows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetOverflowPolicy {
    /// The rejected request's epsilon stays in the running total, so every
    /// later request is checked against the overflowed sum
    #[default]
    CountRejected,
    /// The rejected request's epsilon is taken back out, so a later, smaller
    /// request may still fit in what remains
    ExcludeRejected,
}

/// Configuration for batch validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Interval and termination policy for the scale search
    pub scale_search: SearchBounds,
    /// Slack subtracted before every "total ≤ budget" comparison
    pub epsilon_offset: f64,
    /// Input distance the calibrated chains must be private for
    pub input_distance: u32,
    /// Confidence level for counts and histograms that do not state one
    pub default_confidence_level: f64,
    /// Running-total behaviour after a budget overflow
    pub overflow_policy: BudgetOverflowPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            scale_search: SearchBounds::default(),
            epsilon_offset: MAX_EPSILON_OFFSET,
            input_distance: 1,
            default_confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            overflow_policy: BudgetOverflowPolicy::default(),
        }
    }
}

impl ValidationConfig {
    /// Parse a config from JSON, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ValidationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Reject settings that would make calibration or budgeting meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scale_search
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if !(self.epsilon_offset >= 0.0 && self.epsilon_offset < 1e-6) {
            return Err(ConfigError::Invalid(format!(
                "epsilon_offset must be in [0, 1e-6), got {}",
                self.epsilon_offset
            )));
        }
        if self.input_distance == 0 {
            return Err(ConfigError::Invalid(
                "input_distance must be at least 1".to_string(),
            ));
        }
        if !(self.default_confidence_level > 0.0 && self.default_confidence_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "default_confidence_level must be in (0, 1), got {}",
                self.default_confidence_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ValidationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.epsilon_offset, MAX_EPSILON_OFFSET);
        assert_eq!(config.overflow_policy, BudgetOverflowPolicy::CountRejected);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ValidationConfig::from_json_str(
            r#"{ "scale_search": { "upper": 5000.0 }, "overflow_policy": "exclude_rejected" }"#,
        )
        .unwrap();
        assert_eq!(config.scale_search.upper, 5000.0);
        assert_eq!(config.scale_search.lower, 0.0);
        assert_eq!(config.input_distance, 1);
        assert_eq!(config.overflow_policy, BudgetOverflowPolicy::ExcludeRejected);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(ValidationConfig::from_json_str(r#"{ "input_distance": 0 }"#).is_err());
        assert!(ValidationConfig::from_json_str(r#"{ "epsilon_offset": 0.5 }"#).is_err());
        assert!(ValidationConfig::from_json_str(r#"{ "default_confidence_level": 1.0 }"#).is_err());
        assert!(
            ValidationConfig::from_json_str(r#"{ "scale_search": { "lower": 10.0, "upper": 1.0 } }"#)
                .is_err()
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ValidationConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ValidationConfig::from_file("/nonexistent/dp-release-config.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}

//! Externally settable parameters.
//!
//! Only the likelihood weights, the prior smoothing term, the confidence level thresholds
//! and the cell-size tolerance are configurable. Everything else is a fixed constant of
//! the module that uses it.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete configuration, passed explicitly into each component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bytes either side of the 514-byte cell size still counted as cell-sized
    #[serde(default = "default_cell_tolerance")]
    pub cell_tolerance: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_time_weight")]
    pub time_weight: f64,

    #[serde(default = "default_traffic_weight")]
    pub traffic_weight: f64,

    #[serde(default = "default_stability_weight")]
    pub stability_weight: f64,

    /// Additive smoothing applied to every prior before renormalization
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,

    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
}

fn default_cell_tolerance() -> u32 {
    50
}

fn default_time_weight() -> f64 {
    0.35
}

fn default_traffic_weight() -> f64 {
    0.40
}

fn default_stability_weight() -> f64 {
    0.25
}

fn default_smoothing() -> f64 {
    0.01
}

fn default_medium_threshold() -> f64 {
    0.50
}

fn default_high_threshold() -> f64 {
    0.75
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cell_tolerance: default_cell_tolerance(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            time_weight: default_time_weight(),
            traffic_weight: default_traffic_weight(),
            stability_weight: default_stability_weight(),
            smoothing: default_smoothing(),
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            medium_threshold: default_medium_threshold(),
            high_threshold: default_high_threshold(),
        }
    }
}

impl InferenceConfig {
    /// Checks the weights and smoothing term without normalizing them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("time_weight", self.time_weight),
            ("traffic_weight", self.traffic_weight),
            ("stability_weight", self.stability_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
            return Err(ConfigError::ValidationError(
                "likelihood weights must not all be zero".to_string(),
            ));
        }
        if !self.smoothing.is_finite() || self.smoothing < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "smoothing must be a finite, non-negative number (got {})",
                self.smoothing
            )));
        }
        Ok(())
    }
}

impl ConfidenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |t: f64| t.is_finite() && t > 0.0 && t <= 0.85;
        if !in_range(self.medium_threshold) || !in_range(self.high_threshold) {
            return Err(ConfigError::ValidationError(
                "confidence thresholds must lie in (0, 0.85]".to_string(),
            ));
        }
        if self.medium_threshold >= self.high_threshold {
            return Err(ConfigError::ValidationError(format!(
                "medium_threshold ({}) must be below high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.cell_tolerance > 514 {
            return Err(ConfigError::ValidationError(format!(
                "cell_tolerance {} is larger than the cell itself",
                self.capture.cell_tolerance
            )));
        }
        self.inference.validate()?;
        self.confidence.validate()?;
        Ok(())
    }
}

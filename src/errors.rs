//! Error taxonomy.
//!
//! Parsing-layer problems are local and recoverable wherever a partial result is still
//! useful, so only an unusable capture surfaces as [CaptureError]. Inference errors are
//! caller-contract violations and are always surfaced, never defaulted.
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Bad magic number or a buffer too small to hold the global header.
    #[error("malformed capture: {0}")]
    Malformed(String),

    #[error("failed to read capture: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("invalid prior input: {0}")]
    InvalidPriorInput(String),

    #[error("unknown candidate relay {0}")]
    UnknownCandidate(String),

    #[error("invalid likelihood: {name} = {value} is outside [0, 1]")]
    InvalidLikelihood { name: &'static str, value: f64 },

    #[error("invalid likelihood weights: {0}")]
    InvalidWeights(String),

    #[error("priors have not been set")]
    PriorsNotSet,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read relay catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse relay catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate relay fingerprint {0}")]
    DuplicateFingerprint(String),
}

/// Umbrella error for the pipeline and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

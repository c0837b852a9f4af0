//! Relay catalog, path plausibility, entry inference and confidence rating.
pub mod bayes;
pub mod confidence;
pub mod path;
pub mod relay;

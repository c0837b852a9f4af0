//! guardniff: metadata-only attribution of TOR-style sessions in packet captures.
//!
//! Captures are parsed into flows and bursts, the TOR-like flows are fingerprinted, and
//! with a relay catalog the entry relay is ranked by Bayesian inference over plausible
//! paths. Results are relative likelihoods, never identification.
pub mod analyser;
pub mod config;
pub mod errors;
pub mod inference;
pub mod ui;

pub use analyser::core::{analyse, AnalysisOptions, CaseReport};
pub use config::Config;
pub use errors::{Error, Result};

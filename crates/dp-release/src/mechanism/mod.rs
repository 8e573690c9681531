//! Noise mechanism library interface
//!
//! The validation engine never adds noise itself. It hands a
//! [`ChainDescriptor`] to a [`MechanismLibrary`], asks the resulting
//! [`Chain`] whether a given scale satisfies the requested epsilon, and
//! converts the calibrated scale into an accuracy statement.
//!
//! [`ReferenceLibrary`] is the built-in implementation: Laplace noise for
//! continuous statistics and two-sided geometric noise for counts.

pub mod noise;
pub mod reference;

use crate::chain::ChainDescriptor;
use crate::search::SearchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use reference::{ReferenceChain, ReferenceLibrary};

/// Error type for mechanism operations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum MechanismError {
    #[error("invalid chain: {0}")]
    InvalidChain(String),
    #[error("scale calibration failed: {0}")]
    Calibration(#[from] SearchError),
    #[error("invalid accuracy request: {0}")]
    Accuracy(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Noise family a chain ends with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    /// Continuous Laplace noise, for means and sums
    Laplace,
    /// Discrete two-sided geometric noise, for counts and histograms
    Geometric,
}

impl fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoiseKind::Laplace => "laplace",
            NoiseKind::Geometric => "geometric",
        })
    }
}

/// Output of an executed chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseValue {
    Float(f64),
    Integer(i64),
    Counts(Vec<i64>),
}

/// An executable chain
pub trait Chain {
    /// Whether the chain is `epsilon`-DP for inputs at distance `d_in`
    fn satisfies(&self, d_in: u32, epsilon: f64) -> Result<bool, MechanismError>;

    /// Run the chain over rows of string cells (an empty cell is missing)
    fn execute(&self, records: &[Vec<String>]) -> Result<ReleaseValue, MechanismError>;
}

/// Builds chains from descriptors and translates scales into accuracy
pub trait MechanismLibrary {
    type Chain: Chain;

    fn build_chain(&self, descriptor: &ChainDescriptor) -> Result<Self::Chain, MechanismError>;

    /// Half-width of the interval that holds the noise with probability `1 − alpha`
    fn scale_to_accuracy(
        &self,
        kind: NoiseKind,
        scale: f64,
        alpha: f64,
    ) -> Result<f64, MechanismError>;
}

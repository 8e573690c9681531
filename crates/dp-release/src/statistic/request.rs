//! Statistic request records

use crate::binning::BinStrategy;
use crate::mechanism::NoiseKind;
use crate::variable::InputValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of statistic to release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticKind {
    Mean,
    Sum,
    Count,
    Histogram,
}

impl StatisticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatisticKind::Mean => "mean",
            StatisticKind::Sum => "sum",
            StatisticKind::Count => "count",
            StatisticKind::Histogram => "histogram",
        }
    }

    /// Continuous statistics get Laplace noise, counts get geometric noise
    pub fn noise_kind(self) -> NoiseKind {
        match self {
            StatisticKind::Mean | StatisticKind::Sum => NoiseKind::Laplace,
            StatisticKind::Count | StatisticKind::Histogram => NoiseKind::Geometric,
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How missing values are handled before aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    Drop,
    #[serde(alias = "insert-fixed")]
    InsertFixed,
    #[serde(alias = "insert-random")]
    InsertRandom,
}

/// One statistic in a validation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRequest {
    pub variable: String,
    pub statistic: StatisticKind,
    pub epsilon: f64,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    pub missing_value_policy: MissingValuePolicy,
    #[serde(default)]
    pub fixed_value: Option<InputValue>,
    /// A locked epsilon is kept as-is when the budget is redistributed
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub histogram_bin_strategy: Option<BinStrategy>,
    #[serde(default)]
    pub histogram_bin_count: Option<usize>,
    #[serde(default)]
    pub histogram_bin_edges: Option<Vec<InputValue>>,
}

impl StatisticRequest {
    /// Request with the drop-missing policy and no optional fields
    pub fn new(variable: impl Into<String>, statistic: StatisticKind, epsilon: f64) -> Self {
        Self {
            variable: variable.into(),
            statistic,
            epsilon,
            delta: None,
            confidence_level: None,
            missing_value_policy: MissingValuePolicy::Drop,
            fixed_value: None,
            locked: false,
            histogram_bin_strategy: None,
            histogram_bin_count: None,
            histogram_bin_edges: None,
        }
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = Some(level);
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_missing_values(
        mut self,
        policy: MissingValuePolicy,
        fixed_value: Option<InputValue>,
    ) -> Self {
        self.missing_value_policy = policy;
        self.fixed_value = fixed_value;
        self
    }

    pub fn with_bins(
        mut self,
        strategy: BinStrategy,
        count: Option<usize>,
        edges: Option<Vec<InputValue>>,
    ) -> Self {
        self.histogram_bin_strategy = Some(strategy);
        self.histogram_bin_count = count;
        self.histogram_bin_edges = edges;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

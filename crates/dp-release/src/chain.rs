//! Chain descriptors
//!
//! A chain is the ordered pipeline a statistic runs over one column:
//!
//! ```text
//! select column → cast → missing values → [clamp → resize] → [bin] → aggregate → noise
//! ```
//!
//! The descriptor is plain data. It can be logged, compared and serialized,
//! and a mechanism library turns it into something executable.

use crate::mechanism::{MechanismError, NoiseKind};
use crate::variable::{InputValue, VariableType};
use serde::{Deserialize, Serialize};

/// Aggregation applied after the per-record transformations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    Sum,
    Mean,
    /// One count per category, plus a trailing count for everything else
    /// when `null_category` is set
    CountByCategories {
        categories: Vec<String>,
        null_category: bool,
    },
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ChainStage {
    SelectColumn { index: usize, name: String },
    Cast { to: VariableType },
    DropMissing,
    ImputeConstant { value: InputValue },
    ImputeUniform { min: f64, max: f64, integer: bool },
    ImputeCategory { categories: Vec<String> },
    Clamp { min: f64, max: f64 },
    /// Fix the record count: subsample when larger, pad with `constant` when smaller
    Resize { size: u64, constant: f64 },
    /// Replace each value with the label of its bin; out-of-range values become missing
    BinByEdges { edges: Vec<f64>, labels: Vec<String> },
    Aggregate { aggregation: Aggregation },
    AddNoise { mechanism: NoiseKind, scale: f64 },
}

impl ChainStage {
    pub fn name(&self) -> &'static str {
        match self {
            ChainStage::SelectColumn { .. } => "select_column",
            ChainStage::Cast { .. } => "cast",
            ChainStage::DropMissing => "drop_missing",
            ChainStage::ImputeConstant { .. } => "impute_constant",
            ChainStage::ImputeUniform { .. } => "impute_uniform",
            ChainStage::ImputeCategory { .. } => "impute_category",
            ChainStage::Clamp { .. } => "clamp",
            ChainStage::Resize { .. } => "resize",
            ChainStage::BinByEdges { .. } => "bin_by_edges",
            ChainStage::Aggregate { .. } => "aggregate",
            ChainStage::AddNoise { .. } => "add_noise",
        }
    }
}

/// Ordered list of stages making up one statistic's chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    stages: Vec<ChainStage>,
}

impl ChainDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn then(mut self, stage: ChainStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[ChainStage] {
        &self.stages
    }

    /// Copy of this chain with its noise stage set to `scale`
    pub fn with_scale(&self, scale: f64) -> Self {
        let mut chain = self.clone();
        for stage in &mut chain.stages {
            if let ChainStage::AddNoise { scale: s, .. } = stage {
                *s = scale;
            }
        }
        chain
    }

    /// The aggregation, if the chain has one
    pub fn aggregation(&self) -> Option<&Aggregation> {
        self.stages.iter().find_map(|stage| match stage {
            ChainStage::Aggregate { aggregation } => Some(aggregation),
            _ => None,
        })
    }

    /// Mechanism and scale of the noise stage
    pub fn noise(&self) -> Option<(NoiseKind, f64)> {
        self.stages.iter().find_map(|stage| match stage {
            ChainStage::AddNoise { mechanism, scale } => Some((*mechanism, *scale)),
            _ => None,
        })
    }

    /// Bounds of the clamp stage
    pub fn clamp_bounds(&self) -> Option<(f64, f64)> {
        self.stages.iter().find_map(|stage| match stage {
            ChainStage::Clamp { min, max } => Some((*min, *max)),
            _ => None,
        })
    }

    /// Target size of the resize stage
    pub fn resize_size(&self) -> Option<u64> {
        self.stages.iter().find_map(|stage| match stage {
            ChainStage::Resize { size, .. } => Some(*size),
            _ => None,
        })
    }

    /// `select_column → cast → … → add_noise`
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(ChainStage::name)
            .collect::<Vec<_>>()
            .join(" → ")
    }

    /// Check the stage order: a column selection first, then transformations,
    /// then exactly one aggregation immediately followed by the noise stage.
    pub fn check_structure(&self) -> Result<(), MechanismError> {
        let invalid = |msg: &str| Err(MechanismError::InvalidChain(msg.to_string()));

        let n = self.stages.len();
        if n < 3 {
            return invalid("a chain needs a column selection, an aggregation and a noise stage");
        }
        if !matches!(self.stages[0], ChainStage::SelectColumn { .. }) {
            return invalid("the first stage must select a column");
        }
        if !matches!(self.stages[n - 2], ChainStage::Aggregate { .. }) {
            return invalid("the aggregation must come right before the noise stage");
        }
        match self.stages[n - 1] {
            ChainStage::AddNoise { scale, .. } if scale.is_finite() && scale >= 0.0 => {}
            ChainStage::AddNoise { .. } => return invalid("noise scale must be finite and non-negative"),
            _ => return invalid("the last stage must add noise"),
        }
        let extra = self.stages[1..n - 2].iter().any(|stage| {
            matches!(
                stage,
                ChainStage::SelectColumn { .. }
                    | ChainStage::Aggregate { .. }
                    | ChainStage::AddNoise { .. }
            )
        });
        if extra {
            return invalid("column selection, aggregation and noise may each appear only once");
        }
        Ok(())
    }
}

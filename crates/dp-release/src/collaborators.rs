//! Collaborator records and lookup traits
//!
//! Variable metadata, dataset records and release plans live outside the
//! engine. These traits are the only way it reads or writes them.

use crate::variable::VariableInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The user acting on a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
        }
    }
}

/// A release plan drawing epsilon from one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan_id: String,
    pub dataset_id: String,
    pub owner: String,
    /// Unset until the plan's budget has been allocated
    #[serde(default)]
    pub epsilon: Option<f64>,
}

impl PlanRecord {
    pub fn new(
        plan_id: impl Into<String>,
        dataset_id: impl Into<String>,
        owner: impl Into<String>,
        epsilon: Option<f64>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            dataset_id: dataset_id.into(),
            owner: owner.into(),
            epsilon,
        }
    }
}

/// A dataset and its privacy budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub dataset_id: String,
    /// Set once by the dataset owner
    #[serde(default)]
    pub total_epsilon: Option<f64>,
    /// Number of rows, once profiled
    #[serde(default)]
    pub size: Option<u64>,
    /// Column names in file order
    #[serde(default)]
    pub columns: Vec<String>,
}

impl DatasetRecord {
    /// Position of `name` among the dataset's columns
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Error type for plan writes
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PlanStoreError {
    #[error("plan {0} already exists")]
    Duplicate(String),
    #[error("plan store unavailable: {0}")]
    Unavailable(String),
}

/// Variable metadata lookup
pub trait VariableCatalog {
    fn variable(&self, dataset_id: &str, name: &str) -> Option<VariableInfo>;
}

/// Dataset lookup
pub trait DatasetRegistry {
    fn dataset(&self, dataset_id: &str) -> Option<DatasetRecord>;
}

/// Plan lookup and creation
pub trait PlanDirectory {
    fn plan(&self, plan_id: &str) -> Option<PlanRecord>;

    fn plans_for_dataset(&self, dataset_id: &str) -> Vec<PlanRecord>;

    fn insert_plan(&self, plan: PlanRecord) -> Result<(), PlanStoreError>;
}

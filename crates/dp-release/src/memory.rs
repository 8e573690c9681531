//! In-memory collaborators
//!
//! Backed by `parking_lot::RwLock` maps and loadable from a JSON fixture:
//!
//! ```json
//! {
//!   "datasets": [{ "dataset_id": "d1", "total_epsilon": 1.0, "size": 1000, "columns": ["age"] }],
//!   "plans": [{ "plan_id": "p1", "dataset_id": "d1", "owner": "alice" }],
//!   "variables": { "d1": [{ "name": "age", "type": "integer", "min": 0, "max": 100 }] },
//!   "users": [{ "id": "alice" }]
//! }
//! ```

use crate::collaborators::{
    DatasetRecord, DatasetRegistry, PlanDirectory, PlanRecord, PlanStoreError, Principal,
    VariableCatalog,
};
use crate::variable::VariableInfo;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for fixture loading
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate plan in fixture: {0}")]
    DuplicatePlan(#[from] PlanStoreError),
}

/// Variable metadata keyed by dataset, then variable name
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    variables: RwLock<HashMap<String, HashMap<String, VariableInfo>>>,
}

impl InMemoryCatalog {
    pub fn insert(&self, dataset_id: &str, info: VariableInfo) {
        self.variables
            .write()
            .entry(dataset_id.to_string())
            .or_default()
            .insert(info.name.clone(), info);
    }
}

impl VariableCatalog for InMemoryCatalog {
    fn variable(&self, dataset_id: &str, name: &str) -> Option<VariableInfo> {
        self.variables.read().get(dataset_id)?.get(name).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDatasets {
    datasets: RwLock<HashMap<String, DatasetRecord>>,
}

impl InMemoryDatasets {
    pub fn insert(&self, dataset: DatasetRecord) {
        self.datasets
            .write()
            .insert(dataset.dataset_id.clone(), dataset);
    }
}

impl DatasetRegistry for InMemoryDatasets {
    fn dataset(&self, dataset_id: &str) -> Option<DatasetRecord> {
        self.datasets.read().get(dataset_id).cloned()
    }
}

/// Plans in insertion order
#[derive(Debug, Default)]
pub struct InMemoryPlans {
    plans: RwLock<Vec<PlanRecord>>,
}

impl PlanDirectory for InMemoryPlans {
    fn plan(&self, plan_id: &str) -> Option<PlanRecord> {
        self.plans
            .read()
            .iter()
            .find(|p| p.plan_id == plan_id)
            .cloned()
    }

    fn plans_for_dataset(&self, dataset_id: &str) -> Vec<PlanRecord> {
        self.plans
            .read()
            .iter()
            .filter(|p| p.dataset_id == dataset_id)
            .cloned()
            .collect()
    }

    fn insert_plan(&self, plan: PlanRecord) -> Result<(), PlanStoreError> {
        let mut plans = self.plans.write();
        if plans.iter().any(|p| p.plan_id == plan.plan_id) {
            return Err(PlanStoreError::Duplicate(plan.plan_id));
        }
        plans.push(plan);
        Ok(())
    }
}

/// Serialized form of an in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub datasets: Vec<DatasetRecord>,
    pub plans: Vec<PlanRecord>,
    /// Variable metadata per dataset id
    pub variables: HashMap<String, Vec<VariableInfo>>,
    pub users: Vec<Principal>,
}

impl Fixture {
    pub fn from_json_str(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// All three collaborators plus the known users
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub catalog: InMemoryCatalog,
    pub datasets: InMemoryDatasets,
    pub plans: InMemoryPlans,
    users: HashMap<String, Principal>,
}

impl InMemoryStore {
    pub fn from_fixture(fixture: Fixture) -> Result<Self, FixtureError> {
        let store = InMemoryStore {
            users: fixture
                .users
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect(),
            ..Default::default()
        };
        for dataset in fixture.datasets {
            store.datasets.insert(dataset);
        }
        for plan in fixture.plans {
            store.plans.insert_plan(plan)?;
        }
        for (dataset_id, variables) in fixture.variables {
            for info in variables {
                store.catalog.insert(&dataset_id, info);
            }
        }
        Ok(store)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        Self::from_fixture(Fixture::from_file(path)?)
    }

    /// A known user, or an inactive principal for an unknown id
    pub fn principal(&self, id: &str) -> Principal {
        self.users.get(id).cloned().unwrap_or_else(|| Principal {
            id: id.to_string(),
            active: false,
        })
    }
}

//! Batch Release Validation
//!
//! [`ReleaseValidator::validate_batch`] checks every statistic of a plan
//! against its variable's metadata and the dataset's epsilon budget:
//!
//! 1. Resolve the plan and check that the acting user owns it. Failure
//!    aborts the batch.
//! 2. Read the dataset's total epsilon. Unset or invalid aborts the batch.
//! 3. For each request, in order: resolve metadata, validate the
//!    specification, then add its epsilon to the running total. A request
//!    that pushes the total over the budget is rejected, and the batch
//!    carries on with the next one.
//!
//! Results come back one per request, in request order, and never carry a
//! statistic value.

use crate::collaborators::{DatasetRecord, DatasetRegistry, PlanDirectory, PlanRecord, Principal, VariableCatalog};
use crate::config::{BudgetOverflowPolicy, ValidationConfig};
use crate::ledger::{available_epsilon, redistribute_epsilon_with_offset, within_budget, BudgetError, IntegrityError};
use crate::mechanism::MechanismLibrary;
use crate::statistic::{
    Accuracy, MetadataError, StatisticKind, StatisticRequest, StatisticSpecification, ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// A failure that aborts the whole batch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    #[error("plan {0} not found")]
    PlanNotFound(String),
    #[error("user {user} does not own plan {plan_id}")]
    NotPlanOwner { plan_id: String, user: String },
    #[error("dataset {0} not found")]
    DatasetNotFound(String),
    #[error("dataset {0} has no total epsilon")]
    MaxEpsilonUnset(String),
    #[error("dataset {dataset_id} has an invalid total epsilon: {value}")]
    InvalidMaxEpsilon { dataset_id: String, value: f64 },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
}

/// Outcome for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub variable: String,
    pub statistic: StatisticKind,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<Accuracy>,
}

impl ValidationResult {
    fn invalid(request: &StatisticRequest, error: &ValidationError) -> Self {
        Self {
            variable: request.variable.clone(),
            statistic: request.statistic,
            valid: false,
            message: Some(error.to_string()),
            accuracy: None,
        }
    }
}

impl From<&StatisticSpecification> for ValidationResult {
    fn from(spec: &StatisticSpecification) -> Self {
        Self {
            variable: spec.variable().to_string(),
            statistic: spec.statistic(),
            valid: spec.is_valid(),
            message: spec.errors().first().map(|e| e.to_string()),
            accuracy: spec.accuracy().cloned(),
        }
    }
}

/// Per-request outcome with the statistic specification, when one could be built
#[derive(Debug, Clone)]
pub enum BatchEntry {
    /// Metadata could not be resolved
    Skipped {
        request: StatisticRequest,
        error: ValidationError,
    },
    Validated(StatisticSpecification),
}

impl BatchEntry {
    pub fn result(&self) -> ValidationResult {
        match self {
            BatchEntry::Skipped { request, error } => ValidationResult::invalid(request, error),
            BatchEntry::Validated(spec) => spec.into(),
        }
    }

    pub fn specification(&self) -> Option<&StatisticSpecification> {
        match self {
            BatchEntry::Validated(spec) => Some(spec),
            BatchEntry::Skipped { .. } => None,
        }
    }
}

/// Validates statistic batches against collaborators and a mechanism library
pub struct ReleaseValidator<'a, L: MechanismLibrary> {
    variables: &'a dyn VariableCatalog,
    datasets: &'a dyn DatasetRegistry,
    plans: &'a dyn PlanDirectory,
    library: &'a L,
    config: ValidationConfig,
}

impl<'a, L: MechanismLibrary> ReleaseValidator<'a, L> {
    pub fn new(
        variables: &'a dyn VariableCatalog,
        datasets: &'a dyn DatasetRegistry,
        plans: &'a dyn PlanDirectory,
        library: &'a L,
    ) -> Self {
        Self {
            variables,
            datasets,
            plans,
            library,
            config: ValidationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate every request of a batch; one result per request, in order
    pub fn validate_batch(
        &self,
        plan_id: &str,
        user: &Principal,
        requests: &[StatisticRequest],
    ) -> Result<Vec<ValidationResult>, OrchestrationError> {
        Ok(self
            .validate_batch_detailed(plan_id, user, requests)?
            .iter()
            .map(BatchEntry::result)
            .collect())
    }

    /// [`validate_batch`](Self::validate_batch), keeping the specifications
    /// so valid ones can be executed
    pub fn validate_batch_detailed(
        &self,
        plan_id: &str,
        user: &Principal,
        requests: &[StatisticRequest],
    ) -> Result<Vec<BatchEntry>, OrchestrationError> {
        let plan = self.owned_plan(plan_id, user)?;
        let dataset = self.dataset(&plan.dataset_id)?;
        let max_epsilon = max_epsilon(&dataset)?;

        let offset = self.config.epsilon_offset;
        let mut running = 0.0;
        let mut entries = Vec::with_capacity(requests.len());

        for request in requests {
            let mut spec = match self.specification(&dataset, request) {
                Ok(spec) => spec,
                Err(error) => {
                    entries.push(BatchEntry::Skipped {
                        request: request.clone(),
                        error,
                    });
                    continue;
                }
            };

            if spec.validate(self.library, &self.config) {
                running += spec.epsilon();
                if !within_budget(running, max_epsilon, offset) {
                    warn!(
                        plan = plan_id,
                        variable = %request.variable,
                        statistic = %request.statistic,
                        running,
                        max_epsilon,
                        "statistic exceeds the dataset's epsilon budget"
                    );
                    spec.reject(
                        BudgetError::RunningTotalExceedsBudget {
                            running,
                            max_epsilon,
                        }
                        .into(),
                    );
                    if self.config.overflow_policy == BudgetOverflowPolicy::ExcludeRejected {
                        running -= spec.epsilon();
                    }
                }
            }
            entries.push(BatchEntry::Validated(spec));
        }

        let valid = entries
            .iter()
            .filter(|e| e.specification().is_some_and(StatisticSpecification::is_valid))
            .count();
        info!(
            plan = plan_id,
            dataset = %dataset.dataset_id,
            requested = requests.len(),
            valid,
            epsilon_used = running,
            max_epsilon,
            "validated statistics batch"
        );
        Ok(entries)
    }

    /// Even split of the dataset's budget across a plan's unlocked requests
    pub fn redistribute_for_plan(
        &self,
        plan_id: &str,
        user: &Principal,
        requests: Vec<StatisticRequest>,
    ) -> Result<Vec<StatisticRequest>, OrchestrationError> {
        let plan = self.owned_plan(plan_id, user)?;
        let dataset = self.dataset(&plan.dataset_id)?;
        let max_epsilon = max_epsilon(&dataset)?;
        Ok(redistribute_epsilon_with_offset(
            max_epsilon,
            requests,
            self.config.epsilon_offset,
        )?)
    }

    /// Epsilon of the plan's dataset not yet drawn by any plan
    pub fn available_epsilon(&self, dataset_id: &str) -> Result<f64, OrchestrationError> {
        let dataset = self.dataset(dataset_id)?;
        Ok(available_epsilon(&dataset, &self.plans.plans_for_dataset(dataset_id))?)
    }

    fn owned_plan(&self, plan_id: &str, user: &Principal) -> Result<PlanRecord, OrchestrationError> {
        let plan = self
            .plans
            .plan(plan_id)
            .ok_or_else(|| OrchestrationError::PlanNotFound(plan_id.to_string()))?;
        if !user.active || plan.owner != user.id {
            return Err(OrchestrationError::NotPlanOwner {
                plan_id: plan_id.to_string(),
                user: user.id.clone(),
            });
        }
        Ok(plan)
    }

    fn dataset(&self, dataset_id: &str) -> Result<DatasetRecord, OrchestrationError> {
        self.datasets
            .dataset(dataset_id)
            .ok_or_else(|| OrchestrationError::DatasetNotFound(dataset_id.to_string()))
    }

    fn specification(
        &self,
        dataset: &DatasetRecord,
        request: &StatisticRequest,
    ) -> Result<StatisticSpecification, ValidationError> {
        let info = self
            .variables
            .variable(&dataset.dataset_id, &request.variable)
            .ok_or_else(|| MetadataError::VariableNotFound {
                variable: request.variable.clone(),
            })?;
        let column_index =
            dataset
                .column_index(&request.variable)
                .ok_or_else(|| MetadataError::ColumnNotFound {
                    variable: request.variable.clone(),
                })?;
        let size = dataset.size.ok_or(MetadataError::DatasetSizeUnknown)?;
        Ok(StatisticSpecification::new(request, &info, column_index, size))
    }
}

fn max_epsilon(dataset: &DatasetRecord) -> Result<f64, OrchestrationError> {
    let value = dataset
        .total_epsilon
        .ok_or_else(|| OrchestrationError::MaxEpsilonUnset(dataset.dataset_id.clone()))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(OrchestrationError::InvalidMaxEpsilon {
            dataset_id: dataset.dataset_id.clone(),
            value,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::ReferenceLibrary;
    use crate::memory::{Fixture, InMemoryStore};
    use crate::statistic::{MissingValuePolicy, ValidationState};
    use crate::variable::InputValue;

    const FIXTURE: &str = r#"{
        "datasets": [
            { "dataset_id": "d1", "total_epsilon": 1.0, "size": 500, "columns": ["age", "income", "sex"] },
            { "dataset_id": "d2", "columns": ["age"] },
            { "dataset_id": "d3", "total_epsilon": -1.0, "size": 10, "columns": ["age"] }
        ],
        "plans": [
            { "plan_id": "p1", "dataset_id": "d1", "owner": "alice" },
            { "plan_id": "p2", "dataset_id": "d2", "owner": "alice" },
            { "plan_id": "p3", "dataset_id": "d3", "owner": "alice" }
        ],
        "variables": {
            "d1": [
                { "name": "age", "type": "integer", "min": 0, "max": 100 },
                { "name": "income", "type": "float", "min": 0, "max": 250000 },
                { "name": "sex", "type": "categorical", "categories": ["f", "m"] },
                { "name": "unlisted", "type": "integer", "min": 0, "max": 1 }
            ]
        },
        "users": [{ "id": "alice" }, { "id": "bob" }]
    }"#;

    fn store() -> InMemoryStore {
        InMemoryStore::from_fixture(Fixture::from_json_str(FIXTURE).unwrap()).unwrap()
    }

    fn count(variable: &str, epsilon: f64) -> StatisticRequest {
        StatisticRequest::new(variable, StatisticKind::Count, epsilon)
    }

    fn run(
        store: &InMemoryStore,
        config: ValidationConfig,
        requests: &[StatisticRequest],
    ) -> Vec<ValidationResult> {
        let library = ReferenceLibrary::new();
        ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library)
            .with_config(config)
            .validate_batch("p1", &store.principal("alice"), requests)
            .unwrap()
    }

    #[test]
    fn test_results_preserve_order() {
        let store = store();
        let results = run(
            &store,
            ValidationConfig::default(),
            &[count("age", 0.2), count("nope", 0.2), count("sex", 0.2)],
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].variable, "age");
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert_eq!(
            results[1].message.as_deref(),
            Some("no metadata found for variable `nope`")
        );
        assert!(results[2].valid);
    }

    #[test]
    fn test_missing_column_is_skipped() {
        let store = store();
        let results = run(&store, ValidationConfig::default(), &[count("unlisted", 0.2)]);
        assert_eq!(
            results[0].message.as_deref(),
            Some("variable `unlisted` is not a column of the dataset")
        );
    }

    #[test]
    fn test_overflow_counts_rejected_by_default() {
        let store = store();
        let results = run(
            &store,
            ValidationConfig::default(),
            &[count("age", 0.6), count("sex", 0.6), count("income", 0.3)],
        );
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert!(results[1]
            .message
            .as_deref()
            .unwrap()
            .starts_with("running total"));
        // 0.6 + 0.6 + 0.3 is still over budget
        assert!(!results[2].valid);
    }

    #[test]
    fn test_overflow_excluding_rejected() {
        let store = store();
        let config = ValidationConfig {
            overflow_policy: BudgetOverflowPolicy::ExcludeRejected,
            ..Default::default()
        };
        let results = run(
            &store,
            config,
            &[count("age", 0.6), count("sex", 0.6), count("income", 0.3)],
        );
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert!(results[2].valid);
    }

    #[test]
    fn test_invalid_requests_consume_no_budget() {
        let store = store();
        let results = run(
            &store,
            ValidationConfig::default(),
            &[
                StatisticRequest::new("sex", StatisticKind::Mean, 0.9),
                count("age", 1.0),
            ],
        );
        assert!(!results[0].valid);
        assert!(results[1].valid);
    }

    #[test]
    fn test_batch_fatal_errors() {
        let store = store();
        let library = ReferenceLibrary::new();
        let validator = ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library);
        let alice = store.principal("alice");
        let requests = [count("age", 0.1)];

        assert_eq!(
            validator.validate_batch("p9", &alice, &requests),
            Err(OrchestrationError::PlanNotFound("p9".to_string()))
        );
        assert!(matches!(
            validator.validate_batch("p1", &store.principal("bob"), &requests),
            Err(OrchestrationError::NotPlanOwner { .. })
        ));
        assert!(matches!(
            validator.validate_batch("p1", &store.principal("mallory"), &requests),
            Err(OrchestrationError::NotPlanOwner { .. })
        ));
        assert_eq!(
            validator.validate_batch("p2", &alice, &requests),
            Err(OrchestrationError::MaxEpsilonUnset("d2".to_string()))
        );
        assert!(matches!(
            validator.validate_batch("p3", &alice, &requests),
            Err(OrchestrationError::InvalidMaxEpsilon { .. })
        ));
    }

    #[test]
    fn test_detailed_batch_keeps_specifications() {
        let store = store();
        let library = ReferenceLibrary::new();
        let validator = ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library);
        let request = StatisticRequest::new("income", StatisticKind::Sum, 0.5)
            .with_confidence_level(0.9)
            .with_missing_values(MissingValuePolicy::InsertFixed, Some(InputValue::Float(0.0)));

        let entries = validator
            .validate_batch_detailed("p1", &store.principal("alice"), &[request, count("nope", 0.1)])
            .unwrap();
        let spec = entries[0].specification().unwrap();
        assert!(spec.is_valid());
        assert!(spec.chain().is_some());
        assert!(entries[1].specification().is_none());
        assert!(!entries[1].result().valid);
    }

    #[test]
    fn test_over_budget_request_drops_chain_and_accuracy() {
        let store = store();
        let library = ReferenceLibrary::new();
        let validator = ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library);
        let requests = [count("age", 0.8), count("sex", 0.8)];

        let entries = validator
            .validate_batch_detailed("p1", &store.principal("alice"), &requests)
            .unwrap();
        let spec = entries[1].specification().unwrap();
        assert_eq!(spec.state(), ValidationState::Invalid);
        assert!(spec.chain().is_none());
        assert!(spec.scale().is_none());
        assert!(spec.accuracy().is_none());
        assert!(spec.execute(&library, &[]).is_err());

        let results = validator
            .validate_batch("p1", &store.principal("alice"), &requests)
            .unwrap();
        assert!(results[0].valid);
        assert!(results[0].accuracy.is_some());
        assert!(!results[1].valid);
        assert!(results[1].accuracy.is_none());
        let json = serde_json::to_value(&results[1]).unwrap();
        assert!(json.get("accuracy").is_none());
    }

    #[test]
    fn test_redistribute_for_plan() {
        let store = store();
        let library = ReferenceLibrary::new();
        let validator = ReleaseValidator::new(&store.catalog, &store.datasets, &store.plans, &library);
        let requests = vec![count("age", 0.5).locked(), count("sex", 0.0), count("income", 0.0)];

        let shares = validator
            .redistribute_for_plan("p1", &store.principal("alice"), requests)
            .unwrap();
        assert_eq!(shares[0].epsilon, 0.5);
        assert!((shares[1].epsilon - 0.25).abs() < 1e-12);
        assert!((shares[2].epsilon - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let result = ValidationResult {
            variable: "age".to_string(),
            statistic: StatisticKind::Count,
            valid: true,
            message: None,
            accuracy: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"variable":"age","statistic":"count","valid":true}"#);
    }
}

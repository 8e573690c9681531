//! Privacy Budget Ledger
//!
//! Every dataset carries a total epsilon, set once by its owner. Each release
//! plan on the dataset draws a share of it, and the shares must never sum to
//! more than the total:
//!
//! ```text
//! Σ plan.epsilon − MAX_EPSILON_OFFSET ≤ total_epsilon
//! ```
//!
//! # Floating-point slack
//!
//! Splitting a budget into N equal shares and adding them back up can land a
//! few ULPs above the budget (1.0 / 3 summed three times is fine, 1.0 / 49
//! summed 49 times is not). Every "total ≤ budget" comparison therefore
//! subtracts [`MAX_EPSILON_OFFSET`] first.
//!
//! # Allocation
//!
//! Reading what is available and writing a new plan are two steps. Two plans
//! created concurrently for the same dataset could both see the same
//! availability and together overdraw it, so [`BudgetLedger::allocate_plan`]
//! holds a per-dataset lock across both.

use crate::collaborators::{DatasetRecord, DatasetRegistry, PlanDirectory, PlanRecord, PlanStoreError};
use crate::statistic::StatisticRequest;
use crate::validation::{validate_epsilon, ParameterError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Slack subtracted before comparing an epsilon total against a budget
pub const MAX_EPSILON_OFFSET: f64 = 1e-14;

/// Error type for budget decisions
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum BudgetError {
    #[error("locked statistics use ε={locked}, leaving no room within the budget of ε={max_epsilon}")]
    LockedTotalExceedsBudget { locked: f64, max_epsilon: f64 },
    #[error("running total ε={running} exceeds the budget of ε={max_epsilon}")]
    RunningTotalExceedsBudget { running: f64, max_epsilon: f64 },
    #[error("requested ε={requested} but only ε={available} is available")]
    Insufficient { requested: f64, available: f64 },
    #[error("invalid budget parameter: {0}")]
    InvalidParameter(String),
}

impl From<ParameterError> for BudgetError {
    fn from(e: ParameterError) -> Self {
        BudgetError::InvalidParameter(e.to_string())
    }
}

/// A stored ledger violates its own invariants
///
/// Never caused by a request; always logged at error level.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum IntegrityError {
    #[error("plan {plan_id} has no epsilon allocated")]
    PlanMissingEpsilon { plan_id: String },
    #[error("dataset {dataset_id} has no total epsilon")]
    TotalEpsilonUnset { dataset_id: String },
    #[error("dataset {dataset_id} is over-allocated: available ε={available}")]
    NegativeAvailableEpsilon { dataset_id: String, available: f64 },
}

/// Error type for ledger writes
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("dataset {0} not found")]
    DatasetNotFound(String),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Store(#[from] PlanStoreError),
}

/// Whether `total` fits within `max_epsilon` once `offset` is subtracted
pub fn within_budget(total: f64, max_epsilon: f64, offset: f64) -> bool {
    total - offset <= max_epsilon
}

/// Epsilon of `dataset` not yet drawn by `plans`
///
/// A plan without an epsilon, an unset total, or a total already overdrawn
/// beyond the offset all mean the ledger is corrupt.
pub fn available_epsilon(dataset: &DatasetRecord, plans: &[PlanRecord]) -> Result<f64, IntegrityError> {
    let result = compute_available(dataset, plans);
    if let Err(e) = &result {
        error!(dataset = %dataset.dataset_id, error = %e, "privacy budget ledger integrity violation");
    }
    result
}

fn compute_available(dataset: &DatasetRecord, plans: &[PlanRecord]) -> Result<f64, IntegrityError> {
    let total = dataset
        .total_epsilon
        .ok_or_else(|| IntegrityError::TotalEpsilonUnset {
            dataset_id: dataset.dataset_id.clone(),
        })?;

    let mut allocated = 0.0;
    for plan in plans {
        allocated += plan.epsilon.ok_or_else(|| IntegrityError::PlanMissingEpsilon {
            plan_id: plan.plan_id.clone(),
        })?;
    }

    let available = total - allocated;
    if !within_budget(allocated, total, MAX_EPSILON_OFFSET) {
        return Err(IntegrityError::NegativeAvailableEpsilon {
            dataset_id: dataset.dataset_id.clone(),
            available,
        });
    }
    Ok(available.max(0.0))
}

/// Something holding an epsilon share that redistribution may rewrite
pub trait BudgetShare {
    fn epsilon(&self) -> f64;

    fn set_epsilon(&mut self, epsilon: f64);

    /// Locked shares keep their epsilon
    fn locked(&self) -> bool;
}

impl BudgetShare for StatisticRequest {
    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    fn locked(&self) -> bool {
        self.locked
    }
}

/// Split what the locked shares leave of `max_epsilon` evenly across the
/// unlocked ones
///
/// Fails when the locked shares already exceed the budget, or when they use
/// all of it and unlocked shares remain. Pure: the same input always gives
/// the same output.
pub fn redistribute_epsilon<T: BudgetShare>(max_epsilon: f64, specs: Vec<T>) -> Result<Vec<T>, BudgetError> {
    redistribute_epsilon_with_offset(max_epsilon, specs, MAX_EPSILON_OFFSET)
}

/// [`redistribute_epsilon`] with an explicit comparison slack
pub fn redistribute_epsilon_with_offset<T: BudgetShare>(
    max_epsilon: f64,
    mut specs: Vec<T>,
    offset: f64,
) -> Result<Vec<T>, BudgetError> {
    validate_epsilon(max_epsilon)?;

    let mut used = 0.0;
    let mut unlocked = 0usize;
    for spec in &specs {
        if spec.locked() {
            let epsilon = spec.epsilon();
            if !epsilon.is_finite() || epsilon < 0.0 {
                return Err(BudgetError::InvalidParameter(format!(
                    "locked epsilon must be finite and non-negative, got {}",
                    epsilon
                )));
            }
            used += epsilon;
        } else {
            unlocked += 1;
        }
    }

    let no_room = unlocked > 0 && max_epsilon - used <= offset;
    if !within_budget(used, max_epsilon, offset) || no_room {
        return Err(BudgetError::LockedTotalExceedsBudget {
            locked: used,
            max_epsilon,
        });
    }

    if unlocked > 0 {
        let share = (max_epsilon - used) / unlocked as f64;
        debug!(share, unlocked, used, "redistributing epsilon");
        for spec in specs.iter_mut().filter(|s| !s.locked()) {
            spec.set_epsilon(share);
        }
    }
    Ok(specs)
}

/// Serializes plan allocation per dataset
pub struct BudgetLedger {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    offset: f64,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetLedger {
    pub fn new() -> Self {
        Self::with_offset(MAX_EPSILON_OFFSET)
    }

    pub fn with_offset(offset: f64) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            offset,
        }
    }

    /// Lock for a registered dataset; unknown ids never get an entry
    fn dataset_lock<D>(&self, datasets: &D, dataset_id: &str) -> Result<Arc<Mutex<()>>, LedgerError>
    where
        D: DatasetRegistry + ?Sized,
    {
        if datasets.dataset(dataset_id).is_none() {
            return Err(LedgerError::DatasetNotFound(dataset_id.to_string()));
        }
        Ok(self
            .locks
            .lock()
            .entry(dataset_id.to_string())
            .or_default()
            .clone())
    }

    #[cfg(test)]
    fn tracked_datasets(&self) -> usize {
        self.locks.lock().len()
    }

    /// Available epsilon, read under the dataset's lock
    pub fn available<D, P>(&self, datasets: &D, plans: &P, dataset_id: &str) -> Result<f64, LedgerError>
    where
        D: DatasetRegistry + ?Sized,
        P: PlanDirectory + ?Sized,
    {
        let lock = self.dataset_lock(datasets, dataset_id)?;
        let _guard = lock.lock();
        let dataset = datasets
            .dataset(dataset_id)
            .ok_or_else(|| LedgerError::DatasetNotFound(dataset_id.to_string()))?;
        Ok(available_epsilon(&dataset, &plans.plans_for_dataset(dataset_id))?)
    }

    /// Store `plan` if its epsilon fits in what the dataset has left
    ///
    /// Returns the epsilon remaining after the allocation.
    pub fn allocate_plan<D, P>(&self, datasets: &D, plans: &P, plan: PlanRecord) -> Result<f64, LedgerError>
    where
        D: DatasetRegistry + ?Sized,
        P: PlanDirectory + ?Sized,
    {
        let requested = plan.epsilon.ok_or_else(|| {
            BudgetError::InvalidParameter(format!("plan {} has no epsilon to allocate", plan.plan_id))
        })?;
        validate_epsilon(requested).map_err(BudgetError::from)?;

        let lock = self.dataset_lock(datasets, &plan.dataset_id)?;
        let _guard = lock.lock();

        let dataset = datasets
            .dataset(&plan.dataset_id)
            .ok_or_else(|| LedgerError::DatasetNotFound(plan.dataset_id.clone()))?;
        let available = available_epsilon(&dataset, &plans.plans_for_dataset(&plan.dataset_id))?;

        if !within_budget(requested, available, self.offset) {
            warn!(
                dataset = %plan.dataset_id,
                plan = %plan.plan_id,
                requested,
                available,
                "plan allocation exceeds available epsilon"
            );
            return Err(BudgetError::Insufficient {
                requested,
                available,
            }
            .into());
        }

        let plan_id = plan.plan_id.clone();
        let dataset_id = plan.dataset_id.clone();
        plans.insert_plan(plan)?;

        let remaining = (available - requested).max(0.0);
        info!(dataset = %dataset_id, plan = %plan_id, requested, remaining, "allocated plan epsilon");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDatasets, InMemoryPlans};

    #[derive(Debug, Clone, PartialEq)]
    struct Share {
        epsilon: f64,
        locked: bool,
    }

    impl BudgetShare for Share {
        fn epsilon(&self) -> f64 {
            self.epsilon
        }
        fn set_epsilon(&mut self, epsilon: f64) {
            self.epsilon = epsilon;
        }
        fn locked(&self) -> bool {
            self.locked
        }
    }

    fn share(epsilon: f64, locked: bool) -> Share {
        Share { epsilon, locked }
    }

    fn dataset(total: Option<f64>) -> DatasetRecord {
        DatasetRecord {
            dataset_id: "d1".to_string(),
            total_epsilon: total,
            size: Some(100),
            columns: vec![],
        }
    }

    fn plan(id: &str, epsilon: Option<f64>) -> PlanRecord {
        PlanRecord::new(id, "d1", "alice", epsilon)
    }

    #[test]
    fn test_available_epsilon() {
        let plans = vec![plan("p1", Some(0.25)), plan("p2", Some(0.5))];
        let available = available_epsilon(&dataset(Some(1.0)), &plans).unwrap();
        assert!((available - 0.25).abs() < 1e-12);
        assert_eq!(available_epsilon(&dataset(Some(1.0)), &[]).unwrap(), 1.0);
    }

    #[test]
    fn test_available_epsilon_integrity_errors() {
        assert!(matches!(
            available_epsilon(&dataset(Some(1.0)), &[plan("p1", None)]),
            Err(IntegrityError::PlanMissingEpsilon { .. })
        ));
        assert!(matches!(
            available_epsilon(&dataset(None), &[]),
            Err(IntegrityError::TotalEpsilonUnset { .. })
        ));
        assert!(matches!(
            available_epsilon(&dataset(Some(1.0)), &[plan("p1", Some(0.7)), plan("p2", Some(0.7))]),
            Err(IntegrityError::NegativeAvailableEpsilon { .. })
        ));
    }

    #[test]
    fn test_available_epsilon_tolerates_rounding() {
        let plans: Vec<PlanRecord> = (0..49)
            .map(|i| plan(&format!("p{}", i), Some(1.0 / 49.0)))
            .collect();
        assert_eq!(available_epsilon(&dataset(Some(1.0)), &plans).unwrap(), 0.0);
    }

    #[test]
    fn test_redistribute_with_locked_share() {
        let specs = vec![
            share(0.4, true),
            share(0.3, false),
            share(0.3, false),
            share(0.1, false),
        ];
        let result = redistribute_epsilon(1.0, specs).unwrap();
        assert_eq!(result[0].epsilon, 0.4);
        for spec in &result[1..] {
            assert!((spec.epsilon - 0.2).abs() < 1e-12);
        }
        let total: f64 = result.iter().map(|s| s.epsilon).sum();
        assert!(within_budget(total, 1.0, MAX_EPSILON_OFFSET));
    }

    #[test]
    fn test_redistribute_locked_total_fills_budget() {
        let specs = vec![share(0.5, true), share(0.5, true), share(0.1, false)];
        assert!(matches!(
            redistribute_epsilon(1.0, specs),
            Err(BudgetError::LockedTotalExceedsBudget { .. })
        ));
    }

    #[test]
    fn test_redistribute_all_locked_exactly_at_budget() {
        let specs = vec![share(0.5, true), share(0.5, true)];
        assert_eq!(redistribute_epsilon(1.0, specs.clone()).unwrap(), specs);
    }

    #[test]
    fn test_redistribute_locked_over_budget() {
        let specs = vec![share(0.8, true), share(0.3, true)];
        assert!(redistribute_epsilon(1.0, specs).is_err());
    }

    #[test]
    fn test_redistribute_rejects_bad_inputs() {
        assert!(matches!(
            redistribute_epsilon(0.0, vec![share(0.1, false)]),
            Err(BudgetError::InvalidParameter(_))
        ));
        assert!(matches!(
            redistribute_epsilon(1.0, vec![share(f64::NAN, true)]),
            Err(BudgetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_redistribute_statistic_requests() {
        use crate::statistic::StatisticKind;
        let requests = vec![
            StatisticRequest::new("age", StatisticKind::Mean, 0.1).locked(),
            StatisticRequest::new("income", StatisticKind::Sum, 0.9),
        ];
        let result = redistribute_epsilon(0.5, requests).unwrap();
        assert_eq!(result[0].epsilon, 0.1);
        assert!((result[1].epsilon - 0.4).abs() < 1e-12);
    }

    fn stores(total: f64) -> (InMemoryDatasets, InMemoryPlans) {
        let datasets = InMemoryDatasets::default();
        datasets.insert(dataset(Some(total)));
        (datasets, InMemoryPlans::default())
    }

    #[test]
    fn test_allocate_plan() {
        let (datasets, plans) = stores(1.0);
        let ledger = BudgetLedger::new();

        let remaining = ledger
            .allocate_plan(&datasets, &plans, plan("p1", Some(0.6)))
            .unwrap();
        assert!((remaining - 0.4).abs() < 1e-12);

        let err = ledger
            .allocate_plan(&datasets, &plans, plan("p2", Some(0.6)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Budget(BudgetError::Insufficient { .. })));
        assert_eq!(plans.plans_for_dataset("d1").len(), 1);
    }

    #[test]
    fn test_allocate_plan_unknown_dataset() {
        let (datasets, plans) = stores(1.0);
        let err = BudgetLedger::new()
            .allocate_plan(&datasets, &plans, PlanRecord::new("p1", "nope", "alice", Some(0.1)))
            .unwrap_err();
        assert_eq!(err, LedgerError::DatasetNotFound("nope".to_string()));
    }

    #[test]
    fn test_unknown_datasets_leave_no_lock_behind() {
        let (datasets, plans) = stores(1.0);
        let ledger = BudgetLedger::new();

        for id in ["x", "y", "z"] {
            assert!(ledger.available(&datasets, &plans, id).is_err());
        }
        assert_eq!(ledger.tracked_datasets(), 0);

        ledger.available(&datasets, &plans, "d1").unwrap();
        ledger.available(&datasets, &plans, "d1").unwrap();
        assert_eq!(ledger.tracked_datasets(), 1);
    }

    #[test]
    fn test_allocate_plan_requires_epsilon() {
        let (datasets, plans) = stores(1.0);
        let err = BudgetLedger::new()
            .allocate_plan(&datasets, &plans, plan("p1", None))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Budget(BudgetError::InvalidParameter(_))));
    }

    #[test]
    fn test_concurrent_allocations_never_overdraw() {
        let (datasets, plans) = stores(1.0);
        let ledger = BudgetLedger::new();

        let successes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let (ledger, datasets, plans) = (&ledger, &datasets, &plans);
                    scope.spawn(move || {
                        ledger
                            .allocate_plan(datasets, plans, plan(&format!("p{}", i), Some(0.2)))
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(false))
                .filter(|&ok| ok)
                .count()
        });
        assert_eq!(successes, 5);
        let allocated: f64 = plans
            .plans_for_dataset("d1")
            .iter()
            .filter_map(|p| p.epsilon)
            .sum();
        assert!(within_budget(allocated, 1.0, MAX_EPSILON_OFFSET));
        assert_eq!(ledger.available(&datasets, &plans, "d1").unwrap(), 0.0);
    }
}

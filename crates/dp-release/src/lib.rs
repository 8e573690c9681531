//! DP Release - Differentially Private Release Validation
//!
//! Validation and budgeting engine for differentially private statistic
//! releases. An analyst asks for a batch of statistics (mean, sum, count,
//! histogram) over dataset columns; every statistic draws epsilon from the
//! dataset's fixed total budget.
//!
//! # Features
//!
//! - Per-statistic validation state machine with noise-scale calibration
//! - Histogram bin construction by variable type and bin strategy
//! - Budget ledger with floating-point-safe comparisons and even
//!   redistribution across unlocked statistics
//! - Batch orchestration against pluggable metadata collaborators
//! - Built-in Laplace / geometric mechanism library
//!
//! # Example
//!
//! ```rust
//! use dp_release::{
//!     MissingValuePolicy, ReferenceLibrary, StatisticKind, StatisticRequest,
//!     StatisticSpecification, ValidationConfig, VariableInfo, VariableType,
//! };
//!
//! let age = VariableInfo::numeric("age", VariableType::Integer, 0i64, 100i64);
//! let request = StatisticRequest::new("age", StatisticKind::Mean, 0.25)
//!     .with_confidence_level(0.95)
//!     .with_missing_values(MissingValuePolicy::InsertFixed, Some(40i64.into()));
//!
//! let mut spec = StatisticSpecification::new(&request, &age, 0, 1000);
//! assert!(spec.validate(&ReferenceLibrary::new(), &ValidationConfig::default()));
//! println!("{}", spec.accuracy().unwrap().message);
//! ```

pub mod binning;
pub mod chain;
pub mod collaborators;
pub mod config;
pub mod ledger;
pub mod mechanism;
pub mod memory;
pub mod orchestrator;
pub mod search;
pub mod statistic;
pub mod validation;
pub mod variable;

// Re-export commonly used types for convenience
pub use binning::{BinEdges, BinStrategy, HistogramBinningPolicy, HistogramCategories, UNCATEGORIZED};
pub use chain::{Aggregation, ChainDescriptor, ChainStage};
pub use collaborators::{
    DatasetRecord, DatasetRegistry, PlanDirectory, PlanRecord, Principal, VariableCatalog,
};
pub use config::{BudgetOverflowPolicy, ValidationConfig};
pub use ledger::{
    available_epsilon, redistribute_epsilon, BudgetError, BudgetLedger, IntegrityError,
    MAX_EPSILON_OFFSET,
};
pub use mechanism::{Chain, MechanismError, MechanismLibrary, NoiseKind, ReferenceLibrary, ReleaseValue};
pub use orchestrator::{BatchEntry, OrchestrationError, ReleaseValidator, ValidationResult};
pub use statistic::{
    Accuracy, MissingValuePolicy, StatisticKind, StatisticRequest, StatisticSpecification,
    ValidationError, ValidationState,
};
pub use variable::{InputValue, VariableInfo, VariableType};

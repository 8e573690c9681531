//! Statistic Specifications
//!
//! One [`StatisticSpecification`] per requested statistic. Validation runs as
//! a one-way state machine:
//!
//! ```text
//! Unvalidated → StructuralCheck → TypeCoercion → CustomValidation → Valid
//!                      │                │                │
//!                      └────────────────┴────────────────┴──────→ Invalid
//! ```
//!
//! The first error ends validation; later phases never run. A specification
//! in `Valid` or `Invalid` is never validated again.
//!
//! A valid specification carries a chain descriptor with a calibrated noise
//! scale, the smallest the mechanism library accepts for the requested
//! epsilon, and an accuracy statement derived from that scale.

mod request;
mod strategy;

pub use request::{MissingValuePolicy, StatisticKind, StatisticRequest};

use crate::binning::{BinEdgeError, BinStrategy, BinningPolicyError, HistogramCategories};
use crate::chain::{ChainDescriptor, ChainStage};
use crate::config::ValidationConfig;
use crate::ledger::BudgetError;
use crate::mechanism::{Chain, MechanismError, MechanismLibrary, ReleaseValue};
use crate::search::bisect_smallest;
use crate::validation::{validate_confidence_level, validate_delta, validate_epsilon, ParameterError};
use crate::variable::{coerce_numeric, InputValue, Numeric, TypeCoercionError, VariableInfo, VariableType};
use serde::{Deserialize, Serialize};
use strategy::{check_values, strategy_for, RequiredField, StatisticStrategy};
use thiserror::Error;
use tracing::debug;

/// A required field is missing or a parameter is out of range
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("{statistic} requires `{field}`")]
    MissingField {
        statistic: StatisticKind,
        field: &'static str,
    },
    #[error("{statistic} is not supported for {variable_type} variables")]
    UnsupportedVariableType {
        statistic: StatisticKind,
        variable_type: VariableType,
    },
    #[error("{statistic} requires a positive dataset size")]
    MissingDatasetSize { statistic: StatisticKind },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// Bounds that cannot hold together
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("min ({min}) must be less than max ({max})")]
    MinNotLessThanMax { min: f64, max: f64 },
    #[error("fixed value {value} is outside the bounds [{min}, {max}]")]
    FixedValueOutOfBounds { value: f64, min: f64, max: f64 },
    #[error("infeasible histogram bins: {0}")]
    BinEdges(#[from] BinEdgeError),
}

/// Metadata the orchestrator could not resolve for a request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("no metadata found for variable `{variable}`")]
    VariableNotFound { variable: String },
    #[error("variable `{variable}` is not a column of the dataset")]
    ColumnNotFound { variable: String },
    #[error("the dataset size is unknown")]
    DatasetSizeUnknown,
}

/// Why one statistic failed validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    TypeCoercion(#[from] TypeCoercionError),
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    #[error(transparent)]
    BinningPolicy(BinningPolicyError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Mechanism(#[from] MechanismError),
}

impl From<ParameterError> for ValidationError {
    fn from(e: ParameterError) -> Self {
        ValidationError::Structural(e.into())
    }
}

/// Infeasible edges are a bounds problem, everything else a policy one
impl From<BinningPolicyError> for ValidationError {
    fn from(e: BinningPolicyError) -> Self {
        match e {
            BinningPolicyError::Edges(edges) => ValidationError::Bounds(edges.into()),
            other => ValidationError::BinningPolicy(other),
        }
    }
}

/// Pipeline position of a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Unvalidated,
    StructuralCheck,
    TypeCoercion,
    CustomValidation,
    Valid,
    Invalid,
}

impl ValidationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ValidationState::Valid | ValidationState::Invalid)
    }
}

/// Half-width of the noise interval at the requested confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub value: f64,
    pub message: String,
}

/// One statistic, its validation state and, once valid, its calibrated chain
#[derive(Debug, Clone)]
pub struct StatisticSpecification {
    variable: String,
    statistic: StatisticKind,
    variable_type: VariableType,
    column_index: usize,
    dataset_size: u64,
    epsilon: f64,
    delta: f64,
    confidence_level: Option<f64>,
    missing_value_policy: MissingValuePolicy,
    categories: Option<Vec<String>>,
    bin_strategy: Option<BinStrategy>,
    bin_count: Option<usize>,

    raw_fixed_value: Option<InputValue>,
    raw_min: Option<InputValue>,
    raw_max: Option<InputValue>,
    raw_bin_edges: Option<Vec<InputValue>>,

    fixed_value: Option<InputValue>,
    min: Option<Numeric>,
    max: Option<Numeric>,
    bin_edges: Option<Vec<f64>>,
    histogram: Option<HistogramCategories>,

    state: ValidationState,
    errors: Vec<ValidationError>,
    chain: Option<ChainDescriptor>,
    scale: Option<f64>,
    accuracy: Option<Accuracy>,
}

impl StatisticSpecification {
    /// Combine a request with the metadata of its variable
    pub fn new(
        request: &StatisticRequest,
        info: &VariableInfo,
        column_index: usize,
        dataset_size: u64,
    ) -> Self {
        Self {
            variable: request.variable.clone(),
            statistic: request.statistic,
            variable_type: info.variable_type,
            column_index,
            dataset_size,
            epsilon: request.epsilon,
            delta: request.delta.unwrap_or(0.0),
            confidence_level: request.confidence_level,
            missing_value_policy: request.missing_value_policy,
            categories: info.categories.clone(),
            bin_strategy: request.histogram_bin_strategy,
            bin_count: request.histogram_bin_count,
            raw_fixed_value: request.fixed_value.clone(),
            raw_min: info.min.clone(),
            raw_max: info.max.clone(),
            raw_bin_edges: request.histogram_bin_edges.clone(),
            fixed_value: None,
            min: None,
            max: None,
            bin_edges: None,
            histogram: None,
            state: ValidationState::Unvalidated,
            errors: Vec::new(),
            chain: None,
            scale: None,
            accuracy: None,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn statistic(&self) -> StatisticKind {
        self.statistic
    }

    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }

    /// Errors in the order they were found
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Calibrated chain; present only once valid
    pub fn chain(&self) -> Option<&ChainDescriptor> {
        self.chain.as_ref()
    }

    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    pub fn accuracy(&self) -> Option<&Accuracy> {
        self.accuracy.as_ref()
    }

    /// Categories a histogram releases counts for
    pub fn histogram_categories(&self) -> Option<&HistogramCategories> {
        self.histogram.as_ref()
    }

    /// Run the pipeline; returns whether the statistic is valid
    pub fn validate<L: MechanismLibrary>(&mut self, library: &L, config: &ValidationConfig) -> bool {
        if self.state.is_terminal() {
            return self.is_valid();
        }

        match self.run(library, config) {
            Ok(()) => self.enter(ValidationState::Valid),
            Err(e) => {
                debug!(
                    variable = %self.variable,
                    statistic = %self.statistic,
                    phase = ?self.state,
                    error = %e,
                    "statistic failed validation"
                );
                self.invalidate(e);
            }
        }
        self.is_valid()
    }

    /// Record a budget rejection found after validation
    pub(crate) fn reject(&mut self, error: ValidationError) {
        self.invalidate(error);
    }

    /// Only a valid statistic carries a chain, scale and accuracy
    fn invalidate(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.chain = None;
        self.scale = None;
        self.accuracy = None;
        self.enter(ValidationState::Invalid);
    }

    /// Execute the calibrated chain over rows of string cells
    pub fn execute<L: MechanismLibrary>(
        &self,
        library: &L,
        records: &[Vec<String>],
    ) -> Result<ReleaseValue, MechanismError> {
        let chain = self.chain.as_ref().filter(|_| self.is_valid()).ok_or_else(|| {
            MechanismError::Execution(format!(
                "{} of `{}` is not a validated statistic",
                self.statistic, self.variable
            ))
        })?;
        library.build_chain(chain)?.execute(records)
    }

    fn enter(&mut self, state: ValidationState) {
        debug!(variable = %self.variable, statistic = %self.statistic, phase = ?state, "validation phase");
        self.state = state;
    }

    fn run<L: MechanismLibrary>(&mut self, library: &L, config: &ValidationConfig) -> Result<(), ValidationError> {
        let strategy = strategy_for(self.statistic);

        self.enter(ValidationState::StructuralCheck);
        self.check_structure(strategy)?;
        if self.confidence_level.is_none() {
            self.confidence_level = Some(config.default_confidence_level);
        }

        self.enter(ValidationState::TypeCoercion);
        self.coerce()?;

        self.enter(ValidationState::CustomValidation);
        check_values(self)?;
        strategy.validate(self)?;

        let descriptor = strategy.build_chain(self)?;
        let scale = calibrate(library, &descriptor, self.epsilon, config)?;
        let descriptor = descriptor.with_scale(scale);
        debug!(
            variable = %self.variable,
            statistic = %self.statistic,
            scale,
            chain = %descriptor.describe(),
            "calibrated noise scale"
        );

        let confidence = self.confidence_level.unwrap_or(config.default_confidence_level);
        let alpha = (1.0 - confidence) / strategy.alpha_divisor(self);
        let value = library.scale_to_accuracy(self.statistic.noise_kind(), scale, alpha)?;

        self.accuracy = Some(Accuracy {
            value,
            message: strategy.accuracy_message(confidence, value),
        });
        self.scale = Some(scale);
        self.chain = Some(descriptor);
        Ok(())
    }

    fn check_structure(&self, strategy: &dyn StatisticStrategy) -> Result<(), ValidationError> {
        validate_epsilon(self.epsilon)?;
        validate_delta(self.delta)?;
        if let Some(level) = self.confidence_level {
            validate_confidence_level(level)?;
        }

        if !strategy.accepts(self.variable_type) {
            return Err(StructuralError::UnsupportedVariableType {
                statistic: strategy.kind(),
                variable_type: self.variable_type,
            }
            .into());
        }
        strategy.check_structure(self)?;

        let mut required = strategy.required_fields(self);
        required.extend(self.missing_value_fields());
        for field in required {
            if !field.is_present(self) {
                return Err(StructuralError::MissingField {
                    statistic: self.statistic,
                    field: field.name(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn missing_value_fields(&self) -> Vec<RequiredField> {
        match self.missing_value_policy {
            MissingValuePolicy::Drop => Vec::new(),
            MissingValuePolicy::InsertFixed => vec![RequiredField::FixedValue],
            MissingValuePolicy::InsertRandom if self.variable_type.is_numeric() => {
                vec![RequiredField::Min, RequiredField::Max]
            }
            MissingValuePolicy::InsertRandom => vec![RequiredField::Categories],
        }
    }

    fn coerce(&mut self) -> Result<(), ValidationError> {
        let target = self.variable_type;
        if !target.is_numeric() {
            self.fixed_value = self
                .raw_fixed_value
                .as_ref()
                .map(|v| InputValue::Text(v.to_string()));
            return Ok(());
        }

        self.min = self
            .raw_min
            .as_ref()
            .map(|v| coerce_numeric(v, target, "min"))
            .transpose()?;
        self.max = self
            .raw_max
            .as_ref()
            .map(|v| coerce_numeric(v, target, "max"))
            .transpose()?;
        self.fixed_value = self
            .raw_fixed_value
            .as_ref()
            .map(|v| coerce_numeric(v, target, "fixed_value").map(InputValue::from))
            .transpose()?;
        self.bin_edges = self
            .raw_bin_edges
            .as_ref()
            .map(|edges| {
                edges
                    .iter()
                    .map(|e| coerce_numeric(e, target, "histogram_bin_edges").map(Numeric::as_f64))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(())
    }

    /// Coerced numeric bounds
    pub(crate) fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.min?.as_f64(), self.max?.as_f64()))
    }

    /// Coerced fixed value, when numeric
    pub(crate) fn fixed_numeric(&self) -> Option<f64> {
        match self.fixed_value {
            Some(InputValue::Integer(v)) => Some(v as f64),
            Some(InputValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// `select column → cast → missing-value handling`
    pub(crate) fn preprocessing_chain(&self) -> ChainDescriptor {
        let chain = ChainDescriptor::new()
            .then(ChainStage::SelectColumn {
                index: self.column_index,
                name: self.variable.clone(),
            })
            .then(ChainStage::Cast {
                to: self.variable_type,
            });

        let missing = match (self.missing_value_policy, &self.fixed_value) {
            (MissingValuePolicy::InsertFixed, Some(value)) => ChainStage::ImputeConstant {
                value: value.clone(),
            },
            (MissingValuePolicy::InsertRandom, _) => match (self.bounds(), &self.categories) {
                (Some((min, max)), _) if self.variable_type.is_numeric() => ChainStage::ImputeUniform {
                    min,
                    max,
                    integer: self.variable_type == VariableType::Integer,
                },
                (_, Some(categories)) if !self.variable_type.is_numeric() => ChainStage::ImputeCategory {
                    categories: categories.clone(),
                },
                _ => ChainStage::DropMissing,
            },
            _ => ChainStage::DropMissing,
        };
        chain.then(missing)
    }
}

/// Smallest scale at which the chain satisfies `epsilon`
fn calibrate<L: MechanismLibrary>(
    library: &L,
    descriptor: &ChainDescriptor,
    epsilon: f64,
    config: &ValidationConfig,
) -> Result<f64, MechanismError> {
    bisect_smallest(
        |scale| {
            library
                .build_chain(&descriptor.with_scale(scale))?
                .satisfies(config.input_distance, epsilon)
        },
        &config.scale_search,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::UNCATEGORIZED;
    use crate::chain::Aggregation;
    use crate::mechanism::{NoiseKind, ReferenceLibrary};

    fn validated(request: StatisticRequest, info: VariableInfo) -> StatisticSpecification {
        let mut spec = StatisticSpecification::new(&request, &info, 0, 1000);
        spec.validate(&ReferenceLibrary::new(), &ValidationConfig::default());
        spec
    }

    fn age() -> VariableInfo {
        VariableInfo::numeric("age", VariableType::Integer, 0i64, 100i64)
    }

    fn mean_request(epsilon: f64) -> StatisticRequest {
        StatisticRequest::new("age", StatisticKind::Mean, epsilon)
            .with_confidence_level(0.95)
            .with_missing_values(MissingValuePolicy::InsertFixed, Some(InputValue::Integer(40)))
    }

    #[test]
    fn test_mean_calibrates_and_reports_accuracy() {
        let spec = validated(mean_request(0.25), age());
        assert!(spec.is_valid(), "errors: {:?}", spec.errors());
        assert_eq!(spec.state(), ValidationState::Valid);

        // sensitivity (100 − 0) / 1000, so scale ≈ 0.1 / 0.25
        let scale = spec.scale().unwrap();
        assert!((scale - 0.4).abs() < 1e-6, "scale {}", scale);

        let accuracy = spec.accuracy().unwrap();
        assert!((accuracy.value - 0.4 * 20f64.ln()).abs() < 1e-5);
        assert!(accuracy.message.contains("95%"));

        let chain = spec.chain().unwrap();
        assert_eq!(
            chain.describe(),
            "select_column → cast → impute_constant → clamp → resize → aggregate → add_noise"
        );
        assert_eq!(chain.noise().map(|(kind, _)| kind), Some(NoiseKind::Laplace));
    }

    #[test]
    fn test_terminal_state_is_not_revalidated() {
        let mut spec = validated(mean_request(0.25), age());
        let scale = spec.scale();
        assert!(spec.validate(&ReferenceLibrary::new(), &ValidationConfig::default()));
        assert_eq!(spec.scale(), scale);

        let mut invalid = validated(mean_request(-1.0), age());
        assert!(!invalid.validate(&ReferenceLibrary::new(), &ValidationConfig::default()));
        assert_eq!(invalid.errors().len(), 1);
    }

    #[test]
    fn test_invalid_epsilon_is_structural() {
        let spec = validated(mean_request(0.0), age());
        assert_eq!(spec.state(), ValidationState::Invalid);
        assert!(matches!(
            spec.errors(),
            [ValidationError::Structural(StructuralError::Parameter(
                ParameterError::InvalidEpsilon { .. }
            ))]
        ));
        assert!(spec.chain().is_none());
        assert!(spec.accuracy().is_none());
    }

    #[test]
    fn test_mean_requires_fixed_value() {
        let request = StatisticRequest::new("age", StatisticKind::Mean, 0.5).with_confidence_level(0.9);
        let spec = validated(request, age());
        assert_eq!(spec.errors()[0].to_string(), "mean requires `fixed_value`");
    }

    #[test]
    fn test_mean_requires_bounds() {
        let info = VariableInfo {
            max: None,
            ..age()
        };
        let spec = validated(mean_request(0.5), info);
        assert_eq!(spec.errors()[0].to_string(), "mean requires `max`");
    }

    #[test]
    fn test_mean_requires_dataset_size() {
        let mut spec = StatisticSpecification::new(&mean_request(0.5), &age(), 0, 0);
        assert!(!spec.validate(&ReferenceLibrary::new(), &ValidationConfig::default()));
        assert!(matches!(
            spec.errors()[0],
            ValidationError::Structural(StructuralError::MissingDatasetSize { .. })
        ));
    }

    #[test]
    fn test_sum_rejects_categorical() {
        let request = StatisticRequest::new("sex", StatisticKind::Sum, 0.5).with_confidence_level(0.9);
        let spec = validated(request, VariableInfo::categorical("sex", &["f", "m"]));
        assert!(matches!(
            spec.errors()[0],
            ValidationError::Structural(StructuralError::UnsupportedVariableType { .. })
        ));
    }

    #[test]
    fn test_fixed_value_coercion_failure() {
        let request = StatisticRequest::new("age", StatisticKind::Mean, 0.5)
            .with_confidence_level(0.9)
            .with_missing_values(MissingValuePolicy::InsertFixed, Some("forty".into()));
        let spec = validated(request, age());
        assert_eq!(
            spec.errors(),
            &[ValidationError::TypeCoercion(TypeCoercionError {
                field: "fixed_value".to_string(),
                value: "forty".to_string(),
                expected: VariableType::Integer,
            })]
        );
    }

    #[test]
    fn test_fixed_value_out_of_bounds() {
        let request = StatisticRequest::new("age", StatisticKind::Sum, 0.5)
            .with_confidence_level(0.9)
            .with_missing_values(MissingValuePolicy::InsertFixed, Some(InputValue::Integer(140)));
        let spec = validated(request, age());
        assert!(matches!(
            spec.errors()[0],
            ValidationError::Bounds(BoundsError::FixedValueOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_min_not_less_than_max() {
        let info = VariableInfo::numeric("age", VariableType::Integer, 50i64, 50i64);
        let spec = validated(mean_request(0.5), info);
        assert!(matches!(
            spec.errors()[0],
            ValidationError::Bounds(BoundsError::MinNotLessThanMax { .. })
        ));
    }

    #[test]
    fn test_count_defaults_confidence_level() {
        let spec = validated(StatisticRequest::new("age", StatisticKind::Count, 1.0), age());
        assert!(spec.is_valid(), "errors: {:?}", spec.errors());
        assert!(spec.accuracy().unwrap().message.starts_with("There is a 95% probability"));
        assert_eq!(spec.chain().unwrap().aggregation(), Some(&Aggregation::Count));
        assert!((spec.scale().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_insert_random_categorical_needs_categories() {
        let request = StatisticRequest::new("sex", StatisticKind::Count, 1.0)
            .with_missing_values(MissingValuePolicy::InsertRandom, None);
        let info = VariableInfo {
            categories: None,
            ..VariableInfo::categorical("sex", &[])
        };
        let spec = validated(request, info);
        assert_eq!(spec.errors()[0].to_string(), "count requires `categories`");
    }

    #[test]
    fn test_categorical_equal_ranges_histogram_rejected() {
        let request = StatisticRequest::new("sex", StatisticKind::Histogram, 0.5)
            .with_bins(BinStrategy::EqualRanges, Some(3), None);
        let spec = validated(request, VariableInfo::categorical("sex", &["f", "m"]));
        assert!(matches!(
            spec.errors(),
            [ValidationError::BinningPolicy(BinningPolicyError::DisallowedCombination { .. })]
        ));
    }

    #[test]
    fn test_histogram_equal_ranges() {
        let request = StatisticRequest::new("age", StatisticKind::Histogram, 1.0)
            .with_confidence_level(0.95)
            .with_bins(BinStrategy::EqualRanges, Some(5), None);
        let info = VariableInfo::numeric("age", VariableType::Integer, 1i64, 100i64);
        let spec = validated(request, info);
        assert!(spec.is_valid(), "errors: {:?}", spec.errors());

        let categories = spec.histogram_categories().unwrap();
        assert_eq!(
            categories.labels(),
            &["[1,25]", "[26,49]", "[50,74]", "[75,100]", UNCATEGORIZED]
        );
        assert_eq!(
            spec.chain().unwrap().describe(),
            "select_column → cast → drop_missing → bin_by_edges → aggregate → add_noise"
        );
        // α split across the five released counts
        let scale = spec.scale().unwrap();
        let p = (-1.0 / scale).exp();
        let expected = scale * (2.0 / ((0.05 / 5.0) * (1.0 + p))).ln();
        assert!((spec.accuracy().unwrap().value - expected).abs() < 1e-6);
    }

    #[test]
    fn test_histogram_too_many_bins_is_bounds_error() {
        let request = StatisticRequest::new("age", StatisticKind::Histogram, 1.0)
            .with_bins(BinStrategy::EqualRanges, Some(51), None);
        let info = VariableInfo::numeric("age", VariableType::Integer, 1i64, 50i64);
        let spec = validated(request, info);
        assert!(matches!(
            spec.errors()[0],
            ValidationError::Bounds(BoundsError::BinEdges(BinEdgeError::MoreBinsThanValues { .. }))
        ));
    }

    #[test]
    fn test_histogram_explicit_edge_coercion() {
        let request = StatisticRequest::new("income", StatisticKind::Histogram, 1.0).with_bins(
            BinStrategy::ExplicitEdges,
            None,
            Some(vec!["0".into(), "1000.5".into(), "lots".into()]),
        );
        let info = VariableInfo::numeric("income", VariableType::Float, 0.0, 1e6);
        let spec = validated(request, info);
        assert!(matches!(spec.errors()[0], ValidationError::TypeCoercion(_)));
    }

    #[test]
    fn test_histogram_requires_strategy() {
        let request = StatisticRequest::new("age", StatisticKind::Histogram, 1.0);
        let spec = validated(request, age());
        assert_eq!(spec.errors()[0].to_string(), "histogram requires `histogram_bin_strategy`");
    }

    #[test]
    fn test_execute_requires_valid_spec() {
        let spec = validated(mean_request(-1.0), age());
        let rows = vec![vec!["10".to_string()]];
        assert!(spec.execute(&ReferenceLibrary::seeded(1), &rows).is_err());
    }

    #[test]
    fn test_execute_categorical_histogram() {
        let request = StatisticRequest::new("sex", StatisticKind::Histogram, 1e6)
            .with_bins(BinStrategy::OnePerValue, None, None);
        let spec = validated(request, VariableInfo::categorical("sex", &["f", "m"]));
        assert!(spec.is_valid(), "errors: {:?}", spec.errors());

        let rows: Vec<Vec<String>> = ["f", "m", "m", "x", ""]
            .iter()
            .map(|v| vec![v.to_string()])
            .collect();
        let released = spec.execute(&ReferenceLibrary::seeded(9), &rows).unwrap();
        let counts = match released {
            ReleaseValue::Counts(counts) => counts,
            other => panic!("expected counts, got {:?}", other),
        };
        let labelled =
            crate::binning::label_counts(spec.histogram_categories().unwrap(), &counts).unwrap();
        assert_eq!(
            labelled,
            vec![
                ("f".to_string(), 1),
                ("m".to_string(), 2),
                (UNCATEGORIZED.to_string(), 1)
            ]
        );
    }
}

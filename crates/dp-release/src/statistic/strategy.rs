//! Per-kind behaviour of the validation pipeline

use super::{
    BoundsError, MissingValuePolicy, StatisticKind, StatisticSpecification, StructuralError,
    ValidationError,
};
use crate::binning::{BinStrategy, BinningInput, BinningPolicyError, HistogramBinningPolicy};
use crate::chain::{Aggregation, ChainDescriptor, ChainStage};
use crate::mechanism::MechanismError;
use crate::variable::VariableType;

/// A field a statistic cannot be validated without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequiredField {
    Min,
    Max,
    FixedValue,
    ConfidenceLevel,
    BinStrategy,
    BinCount,
    BinEdges,
    Categories,
}

impl RequiredField {
    pub(crate) fn name(self) -> &'static str {
        match self {
            RequiredField::Min => "min",
            RequiredField::Max => "max",
            RequiredField::FixedValue => "fixed_value",
            RequiredField::ConfidenceLevel => "confidence_level",
            RequiredField::BinStrategy => "histogram_bin_strategy",
            RequiredField::BinCount => "histogram_bin_count",
            RequiredField::BinEdges => "histogram_bin_edges",
            RequiredField::Categories => "categories",
        }
    }

    pub(crate) fn is_present(self, spec: &StatisticSpecification) -> bool {
        match self {
            RequiredField::Min => spec.raw_min.is_some(),
            RequiredField::Max => spec.raw_max.is_some(),
            RequiredField::FixedValue => spec.raw_fixed_value.is_some(),
            RequiredField::ConfidenceLevel => spec.confidence_level.is_some(),
            RequiredField::BinStrategy => spec.bin_strategy.is_some(),
            RequiredField::BinCount => spec.bin_count.is_some(),
            RequiredField::BinEdges => spec.raw_bin_edges.is_some(),
            RequiredField::Categories => spec.categories.as_ref().is_some_and(|c| !c.is_empty()),
        }
    }
}

/// What differs between mean, sum, count and histogram
pub(crate) trait StatisticStrategy: Sync {
    fn kind(&self) -> StatisticKind;

    fn accepts(&self, _variable_type: VariableType) -> bool {
        true
    }

    /// Structural checks beyond field presence
    fn check_structure(&self, _spec: &StatisticSpecification) -> Result<(), ValidationError> {
        Ok(())
    }

    fn required_fields(&self, spec: &StatisticSpecification) -> Vec<RequiredField>;

    /// Kind-specific checks once values are coerced
    fn validate(&self, _spec: &mut StatisticSpecification) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Chain with a zero noise scale, ready for calibration
    fn build_chain(&self, spec: &StatisticSpecification) -> Result<ChainDescriptor, ValidationError>;

    /// Number of released values sharing the failure probability
    fn alpha_divisor(&self, _spec: &StatisticSpecification) -> f64 {
        1.0
    }

    fn accuracy_message(&self, confidence: f64, accuracy: f64) -> String;
}

static MEAN: BoundedStrategy = BoundedStrategy(StatisticKind::Mean);
static SUM: BoundedStrategy = BoundedStrategy(StatisticKind::Sum);
static COUNT: CountStrategy = CountStrategy;
static HISTOGRAM: HistogramStrategy = HistogramStrategy;

pub(crate) fn strategy_for(kind: StatisticKind) -> &'static dyn StatisticStrategy {
    match kind {
        StatisticKind::Mean => &MEAN,
        StatisticKind::Sum => &SUM,
        StatisticKind::Count => &COUNT,
        StatisticKind::Histogram => &HISTOGRAM,
    }
}

fn percent(confidence: f64) -> f64 {
    (confidence * 100.0 * 1e6).round() / 1e6
}

fn with_noise(chain: ChainDescriptor, kind: StatisticKind, aggregation: Aggregation) -> ChainDescriptor {
    chain
        .then(ChainStage::Aggregate { aggregation })
        .then(ChainStage::AddNoise {
            mechanism: kind.noise_kind(),
            scale: 0.0,
        })
}

/// Mean and sum: clamped to the variable's bounds and resized to the dataset size
struct BoundedStrategy(StatisticKind);

impl StatisticStrategy for BoundedStrategy {
    fn kind(&self) -> StatisticKind {
        self.0
    }

    fn accepts(&self, variable_type: VariableType) -> bool {
        variable_type.is_numeric()
    }

    fn check_structure(&self, spec: &StatisticSpecification) -> Result<(), ValidationError> {
        if spec.dataset_size == 0 {
            return Err(StructuralError::MissingDatasetSize { statistic: self.0 }.into());
        }
        Ok(())
    }

    fn required_fields(&self, _spec: &StatisticSpecification) -> Vec<RequiredField> {
        vec![
            RequiredField::Min,
            RequiredField::Max,
            RequiredField::FixedValue,
            RequiredField::ConfidenceLevel,
        ]
    }

    fn build_chain(&self, spec: &StatisticSpecification) -> Result<ChainDescriptor, ValidationError> {
        let (min, max) = spec.bounds().ok_or(StructuralError::MissingField {
            statistic: self.0,
            field: RequiredField::Min.name(),
        })?;
        let constant = spec.fixed_numeric().unwrap_or(min).clamp(min, max);
        let aggregation = match self.0 {
            StatisticKind::Mean => Aggregation::Mean,
            _ => Aggregation::Sum,
        };
        let chain = spec
            .preprocessing_chain()
            .then(ChainStage::Clamp { min, max })
            .then(ChainStage::Resize {
                size: spec.dataset_size,
                constant,
            });
        Ok(with_noise(chain, self.0, aggregation))
    }

    fn accuracy_message(&self, confidence: f64, accuracy: f64) -> String {
        format!(
            "There is a {}% probability that the released {} is within {:.4} of the true {}.",
            percent(confidence),
            self.0,
            accuracy,
            self.0
        )
    }
}

struct CountStrategy;

impl StatisticStrategy for CountStrategy {
    fn kind(&self) -> StatisticKind {
        StatisticKind::Count
    }

    fn required_fields(&self, _spec: &StatisticSpecification) -> Vec<RequiredField> {
        Vec::new()
    }

    fn build_chain(&self, spec: &StatisticSpecification) -> Result<ChainDescriptor, ValidationError> {
        Ok(with_noise(
            spec.preprocessing_chain(),
            StatisticKind::Count,
            Aggregation::Count,
        ))
    }

    fn accuracy_message(&self, confidence: f64, accuracy: f64) -> String {
        format!(
            "There is a {}% probability that the released count is within {:.2} records of the true count.",
            percent(confidence),
            accuracy
        )
    }
}

struct HistogramStrategy;

impl HistogramStrategy {
    fn bin_strategy(spec: &StatisticSpecification) -> Result<BinStrategy, ValidationError> {
        spec.bin_strategy.ok_or_else(|| {
            StructuralError::MissingField {
                statistic: StatisticKind::Histogram,
                field: RequiredField::BinStrategy.name(),
            }
            .into()
        })
    }
}

impl StatisticStrategy for HistogramStrategy {
    fn kind(&self) -> StatisticKind {
        StatisticKind::Histogram
    }

    fn check_structure(&self, spec: &StatisticSpecification) -> Result<(), ValidationError> {
        let strategy = Self::bin_strategy(spec)?;
        let policy = HistogramBinningPolicy::new(spec.variable_type, strategy);
        if !policy.is_allowed() {
            return Err(BinningPolicyError::DisallowedCombination {
                variable_type: spec.variable_type,
                strategy,
            }
            .into());
        }
        Ok(())
    }

    fn required_fields(&self, spec: &StatisticSpecification) -> Vec<RequiredField> {
        let numeric = spec.variable_type.is_numeric();
        match spec.bin_strategy {
            Some(BinStrategy::EqualRanges) => {
                vec![RequiredField::BinCount, RequiredField::Min, RequiredField::Max]
            }
            Some(BinStrategy::ExplicitEdges) => vec![RequiredField::BinEdges],
            Some(BinStrategy::OnePerValue) if numeric => {
                vec![RequiredField::Min, RequiredField::Max]
            }
            Some(BinStrategy::OnePerValue) => vec![RequiredField::Categories],
            None => Vec::new(),
        }
    }

    fn validate(&self, spec: &mut StatisticSpecification) -> Result<(), ValidationError> {
        let policy = HistogramBinningPolicy::new(spec.variable_type, Self::bin_strategy(spec)?);
        let categories = policy.categories(&BinningInput {
            bounds: spec.bounds(),
            bin_count: spec.bin_count,
            explicit_edges: spec.bin_edges.as_deref(),
            categories: spec.categories.as_deref(),
        })?;
        spec.histogram = Some(categories);
        Ok(())
    }

    fn build_chain(&self, spec: &StatisticSpecification) -> Result<ChainDescriptor, ValidationError> {
        let histogram = spec.histogram.as_ref().ok_or_else(|| {
            MechanismError::InvalidChain("histogram categories have not been built".to_string())
        })?;

        let mut chain = spec.preprocessing_chain();
        if let Some(edges) = histogram.edges() {
            chain = chain.then(ChainStage::BinByEdges {
                edges: edges.edges().to_vec(),
                labels: histogram.category_labels().to_vec(),
            });
        } else if let Some((min, max)) = spec.bounds() {
            // one bucket per integer: keep every value inside the labelled range
            chain = chain.then(ChainStage::Clamp { min, max });
        }

        let aggregation = Aggregation::CountByCategories {
            categories: histogram.category_labels().to_vec(),
            null_category: histogram.has_uncategorized(),
        };
        Ok(with_noise(chain, StatisticKind::Histogram, aggregation))
    }

    /// Every count must hold at once, so the failure probability is split
    /// across all of them
    fn alpha_divisor(&self, spec: &StatisticSpecification) -> f64 {
        spec.histogram
            .as_ref()
            .map_or(1.0, |h| h.len().max(1) as f64)
    }

    fn accuracy_message(&self, confidence: f64, accuracy: f64) -> String {
        format!(
            "There is a {}% probability that every released bin count is within {:.2} of its true count.",
            percent(confidence),
            accuracy
        )
    }
}

/// Bounds and fixed-value checks shared by every kind
pub(crate) fn check_values(spec: &StatisticSpecification) -> Result<(), ValidationError> {
    if let Some((min, max)) = spec.bounds() {
        if min >= max {
            return Err(BoundsError::MinNotLessThanMax { min, max }.into());
        }
    }
    if spec.missing_value_policy == MissingValuePolicy::InsertFixed {
        if let (Some(value), Some((min, max))) = (spec.fixed_numeric(), spec.bounds()) {
            if value < min || value > max {
                return Err(BoundsError::FixedValueOutOfBounds { value, min, max }.into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_lookup() {
        for kind in [
            StatisticKind::Mean,
            StatisticKind::Sum,
            StatisticKind::Count,
            StatisticKind::Histogram,
        ] {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_bounded_accepts_numeric_only() {
        let mean = strategy_for(StatisticKind::Mean);
        assert!(mean.accepts(VariableType::Integer));
        assert!(mean.accepts(VariableType::Float));
        assert!(!mean.accepts(VariableType::Categorical));
        assert!(strategy_for(StatisticKind::Count).accepts(VariableType::Categorical));
    }

    #[test]
    fn test_request_fields_match_wire_keys() {
        let request = crate::statistic::StatisticRequest::new("age", StatisticKind::Histogram, 0.5)
            .with_confidence_level(0.9)
            .with_bins(BinStrategy::ExplicitEdges, Some(3), Some(vec![0i64.into(), 5i64.into()]));
        let json = serde_json::to_value(&request).unwrap();
        for field in [
            RequiredField::FixedValue,
            RequiredField::ConfidenceLevel,
            RequiredField::BinStrategy,
            RequiredField::BinCount,
            RequiredField::BinEdges,
        ] {
            assert!(json.get(field.name()).is_some(), "no `{}` key", field.name());
        }
    }

    #[test]
    fn test_percent_formatting() {
        assert_eq!(format!("{}", percent(0.95)), "95");
        assert_eq!(format!("{}", percent(0.999)), "99.9");
    }
}

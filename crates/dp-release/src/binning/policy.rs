//! Histogram binning policy
//!
//! Decides how a histogram's categories are built from the variable type and
//! the requested bin strategy:
//!
//! | Variable type | one-per-value          | equal-ranges | explicit-edges |
//! |---------------|------------------------|--------------|----------------|
//! | Categorical   | declared categories    | rejected     | rejected       |
//! | Integer       | every integer in range | edges        | edges          |
//! | Float         | rejected               | edges        | edges          |

use super::edges::{integer_bounds, BinEdgeError, BinEdges, UNCATEGORIZED};
use crate::variable::VariableType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest number of one-per-value integer categories a histogram may have
pub const MAX_INTEGER_CATEGORIES: i64 = 10_000;

/// Largest bin count an equal-ranges histogram may ask for
pub const MAX_EQUAL_RANGE_BINS: usize = 10_000;

/// How histogram bins are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinStrategy {
    #[serde(alias = "one-per-value")]
    OnePerValue,
    #[serde(alias = "equal-ranges")]
    EqualRanges,
    #[serde(alias = "explicit-edges")]
    ExplicitEdges,
}

impl fmt::Display for BinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinStrategy::OnePerValue => "one-per-value",
            BinStrategy::EqualRanges => "equal-ranges",
            BinStrategy::ExplicitEdges => "explicit-edges",
        })
    }
}

/// Error type for histogram binning
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BinningPolicyError {
    #[error("{strategy} bins are not allowed for {variable_type} variables")]
    DisallowedCombination {
        variable_type: VariableType,
        strategy: BinStrategy,
    },
    #[error("{strategy} bins for {variable_type} variables need {missing}")]
    MissingInput {
        variable_type: VariableType,
        strategy: BinStrategy,
        missing: &'static str,
    },
    #[error("categorical variable declares no categories")]
    NoCategories,
    #[error("{count} histogram categories exceeds the limit of {limit}")]
    TooManyCategories { count: i64, limit: i64 },
    #[error("histogram returned {counts} counts for {labels} category labels")]
    CountMismatch { labels: usize, counts: usize },
    #[error(transparent)]
    Edges(#[from] BinEdgeError),
}

/// Inputs the policy may draw on; which ones are required depends on the cell
#[derive(Debug, Clone, Copy, Default)]
pub struct BinningInput<'a> {
    pub bounds: Option<(f64, f64)>,
    pub bin_count: Option<usize>,
    pub explicit_edges: Option<&'a [f64]>,
    pub categories: Option<&'a [String]>,
}

/// The categories a histogram releases counts for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramCategories {
    /// Labels in release order; includes the trailing uncategorized label
    /// when `has_uncategorized` is set
    labels: Vec<String>,
    /// Present for edge-based strategies
    edges: Option<BinEdges>,
    has_uncategorized: bool,
}

impl HistogramCategories {
    /// Every label, including "uncategorized" where present
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Labels of real categories, without "uncategorized"
    pub fn category_labels(&self) -> &[String] {
        if self.has_uncategorized {
            &self.labels[..self.labels.len() - 1]
        } else {
            &self.labels
        }
    }

    pub fn edges(&self) -> Option<&BinEdges> {
        self.edges.as_ref()
    }

    pub fn has_uncategorized(&self) -> bool {
        self.has_uncategorized
    }

    /// Number of released counts
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Binning policy for one variable type and bin strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramBinningPolicy {
    pub variable_type: VariableType,
    pub strategy: BinStrategy,
}

impl HistogramBinningPolicy {
    pub fn new(variable_type: VariableType, strategy: BinStrategy) -> Self {
        Self {
            variable_type,
            strategy,
        }
    }

    /// Whether the decision table allows this combination
    pub fn is_allowed(&self) -> bool {
        use BinStrategy::*;
        use VariableType::*;
        matches!(
            (self.variable_type, self.strategy),
            (Categorical, OnePerValue)
                | (Integer, OnePerValue)
                | (Integer, EqualRanges)
                | (Integer, ExplicitEdges)
                | (Float, EqualRanges)
                | (Float, ExplicitEdges)
        )
    }

    /// Build the histogram categories
    pub fn categories(
        &self,
        input: &BinningInput<'_>,
    ) -> Result<HistogramCategories, BinningPolicyError> {
        if !self.is_allowed() {
            return Err(BinningPolicyError::DisallowedCombination {
                variable_type: self.variable_type,
                strategy: self.strategy,
            });
        }

        match (self.variable_type, self.strategy) {
            (VariableType::Categorical, _) => {
                let categories = input.categories.ok_or(BinningPolicyError::NoCategories)?;
                if categories.is_empty() {
                    return Err(BinningPolicyError::NoCategories);
                }
                let mut labels = categories.to_vec();
                labels.push(UNCATEGORIZED.to_string());
                Ok(HistogramCategories {
                    labels,
                    edges: None,
                    has_uncategorized: true,
                })
            }
            (_, BinStrategy::OnePerValue) => {
                let (min, max) = self.require(input.bounds, "min and max")?;
                let (lo, hi) = integer_bounds(min, max)?;
                let count = hi - lo + 1;
                if count > MAX_INTEGER_CATEGORIES {
                    return Err(BinningPolicyError::TooManyCategories {
                        count,
                        limit: MAX_INTEGER_CATEGORIES,
                    });
                }
                Ok(HistogramCategories {
                    labels: (lo..=hi).map(|v| v.to_string()).collect(),
                    edges: None,
                    has_uncategorized: false,
                })
            }
            (_, BinStrategy::EqualRanges) => {
                let (min, max) = self.require(input.bounds, "min and max")?;
                let bin_count = self.require(input.bin_count, "a bin count")?;
                BinEdges::check(min, max, bin_count)?;
                if bin_count > MAX_EQUAL_RANGE_BINS {
                    return Err(BinningPolicyError::TooManyCategories {
                        count: i64::try_from(bin_count).unwrap_or(i64::MAX),
                        limit: MAX_EQUAL_RANGE_BINS as i64,
                    });
                }
                Ok(self.edge_categories(BinEdges::new(min, max, bin_count)?))
            }
            (_, BinStrategy::ExplicitEdges) => {
                let edges = self.require(input.explicit_edges, "explicit bin edges")?;
                Ok(self.edge_categories(BinEdges::from_explicit(edges.to_vec())?))
            }
        }
    }

    fn require<T>(&self, value: Option<T>, missing: &'static str) -> Result<T, BinningPolicyError> {
        value.ok_or(BinningPolicyError::MissingInput {
            variable_type: self.variable_type,
            strategy: self.strategy,
            missing,
        })
    }

    fn edge_categories(&self, edges: BinEdges) -> HistogramCategories {
        let labels = match self.variable_type {
            VariableType::Integer => edges.inclusive_buckets().to_vec(),
            _ => edges.exclusive_buckets().to_vec(),
        };
        HistogramCategories {
            labels,
            edges: Some(edges),
            has_uncategorized: true,
        }
    }
}

/// Pair released counts with their category labels
///
/// A length mismatch means the executed chain and the validated categories
/// disagree; it is reported instead of truncating either side.
pub fn label_counts(
    categories: &HistogramCategories,
    counts: &[i64],
) -> Result<Vec<(String, i64)>, BinningPolicyError> {
    if categories.len() != counts.len() {
        tracing::warn!(
            labels = categories.len(),
            counts = counts.len(),
            "histogram counts do not line up with category labels"
        );
        return Err(BinningPolicyError::CountMismatch {
            labels: categories.len(),
            counts: counts.len(),
        });
    }
    Ok(categories
        .labels()
        .iter()
        .cloned()
        .zip(counts.iter().copied())
        .collect())
}

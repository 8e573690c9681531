//! Bin edge construction
//!
//! Turns `(min, max, number_of_bins)` into evenly spaced integer edges and
//! the display buckets histograms are labeled with.
//!
//! Edges follow the half-open convention `[e_i, e_{i+1})`. The last edge is
//! the rounded max plus one, so the max value itself falls inside the last
//! bin. `(1, 100, 5)` gives edges `[1, 26, 50, 75, 101]` and the inclusive
//! buckets `[1,25] [26,49] [50,74] [75,100] uncategorized`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label for values that fall outside every bin
pub const UNCATEGORIZED: &str = "uncategorized";

/// Largest bound magnitude at which every whole number is an exact `f64`
pub const MAX_BIN_BOUND: f64 = 9_007_199_254_740_992.0;

/// Error type for bin edge construction
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum BinEdgeError {
    #[error("min ({min}) and max ({max}) must be whole numbers")]
    NonIntegerBounds { min: f64, max: f64 },
    #[error("bounds [{min}, {max}] exceed ±{limit}")]
    BoundsOutOfRange { min: f64, max: f64, limit: f64 },
    #[error("max ({max}) must be greater than min ({min})")]
    MaxNotGreaterThanMin { min: i64, max: i64 },
    #[error("more bins than values: {bins} bins requested for the {values} values between {min} and {max}")]
    MoreBinsThanValues {
        min: i64,
        max: i64,
        bins: usize,
        values: i64,
    },
    #[error("two edges minimum: got {edges}")]
    TwoEdgesMinimum { edges: usize },
    #[error("bin edges must be strictly increasing and finite (edge {index}: {value})")]
    EdgesNotIncreasing { index: usize, value: f64 },
}

/// Ordered bin edges plus their display buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    edges: Vec<f64>,
    inclusive: Vec<String>,
    exclusive: Vec<String>,
}

impl BinEdges {
    /// Evenly space `number_of_bins` edges across `[min, max]`
    pub fn new(min: f64, max: f64, number_of_bins: usize) -> Result<Self, BinEdgeError> {
        Self::check(min, max, number_of_bins)?;

        let mut edges: Vec<f64> = linspace(min, max, number_of_bins)
            .into_iter()
            .map(f64::round_ties_even)
            .collect();
        if let Some(last) = edges.last_mut() {
            *last += 1.0;
        }

        Ok(Self::labeled(edges))
    }

    /// Run every check of [`BinEdges::new`] without building the edges
    pub fn check(min: f64, max: f64, number_of_bins: usize) -> Result<(), BinEdgeError> {
        let (lo, hi) = integer_bounds(min, max)?;
        let values = hi - lo;
        if i64::try_from(number_of_bins).map_or(true, |bins| bins > values) {
            return Err(BinEdgeError::MoreBinsThanValues {
                min: lo,
                max: hi,
                bins: number_of_bins,
                values,
            });
        }
        if number_of_bins < 2 {
            return Err(BinEdgeError::TwoEdgesMinimum {
                edges: number_of_bins,
            });
        }
        Ok(())
    }

    /// Use caller-supplied edges as-is (no max shift)
    pub fn from_explicit(edges: Vec<f64>) -> Result<Self, BinEdgeError> {
        if edges.len() < 2 {
            return Err(BinEdgeError::TwoEdgesMinimum { edges: edges.len() });
        }
        for (index, value) in edges.iter().enumerate() {
            let increasing = index == 0 || *value > edges[index - 1];
            if !value.is_finite() || !increasing {
                return Err(BinEdgeError::EdgesNotIncreasing {
                    index,
                    value: *value,
                });
            }
        }
        Ok(Self::labeled(edges))
    }

    fn labeled(edges: Vec<f64>) -> Self {
        let integral = edges.iter().all(|e| is_whole(*e));
        let pairs = edges.windows(2);

        let mut exclusive: Vec<String> = pairs
            .clone()
            .map(|w| format!("[{},{})", w[0], w[1]))
            .collect();
        // Fractional edges have no "last included value"
        let mut inclusive: Vec<String> = if integral {
            pairs.map(|w| format!("[{},{}]", w[0], w[1] - 1.0)).collect()
        } else {
            exclusive.clone()
        };
        inclusive.push(UNCATEGORIZED.to_string());
        exclusive.push(UNCATEGORIZED.to_string());

        Self {
            edges,
            inclusive,
            exclusive,
        }
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins between the edges (not counting "uncategorized")
    pub fn bin_count(&self) -> usize {
        self.edges.len() - 1
    }

    /// `"[a,b]"` buckets followed by `"uncategorized"`
    pub fn inclusive_buckets(&self) -> &[String] {
        &self.inclusive
    }

    /// `"[a,b)"` buckets followed by `"uncategorized"`
    pub fn exclusive_buckets(&self) -> &[String] {
        &self.exclusive
    }

    /// Index of the bin containing `value`, or `None` for uncategorized
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        let upper = self.edges.partition_point(|e| *e <= value);
        if upper == 0 || upper == self.edges.len() {
            None
        } else {
            Some(upper - 1)
        }
    }
}

fn is_whole(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0
}

/// Whole-number bounds with `min < max`, small enough that `max − min + 1`
/// fits in an `i64`
pub(crate) fn integer_bounds(min: f64, max: f64) -> Result<(i64, i64), BinEdgeError> {
    if !(is_whole(min) && is_whole(max)) {
        return Err(BinEdgeError::NonIntegerBounds { min, max });
    }
    if min.abs() > MAX_BIN_BOUND || max.abs() > MAX_BIN_BOUND {
        return Err(BinEdgeError::BoundsOutOfRange {
            min,
            max,
            limit: MAX_BIN_BOUND,
        });
    }
    let (lo, hi) = (min as i64, max as i64);
    if lo >= hi {
        return Err(BinEdgeError::MaxNotGreaterThanMin { min: lo, max: hi });
    }
    Ok((lo, hi))
}

/// `count` evenly spaced points over `[start, stop]`, both ends included
fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    let step = (stop - start) / (count - 1) as f64;
    let mut points: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    points[count - 1] = stop;
    points
}

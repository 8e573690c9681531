//! Monotone Bisection Search
//!
//! Noise calibration asks for the smallest scale at which a chain still
//! satisfies its privacy guarantee. The satisfaction predicate is monotone
//! in the scale (more noise never costs more privacy), so a bisection over
//! a bounded interval converges on the boundary.
//!
//! The search always terminates: the upper bound is expanded a bounded
//! number of times and the bisection stops at the tolerance or the
//! iteration cap, whichever comes first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the bisection search
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SearchError {
    /// Bounds are not a usable interval
    #[error("invalid search bounds [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },
    /// Predicate never held, even after expanding the upper bound
    #[error("no value up to {upper} satisfies the predicate")]
    Unsatisfiable { upper: f64 },
}

/// Interval and termination policy for a bisection search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBounds {
    /// Lower end of the initial interval
    pub lower: f64,
    /// Upper end of the initial interval
    pub upper: f64,
    /// Stop once the bracketing interval is at most this wide
    pub tolerance: f64,
    /// Hard cap on bisection steps
    pub max_iterations: u32,
    /// How many times the upper bound may be doubled before giving up
    pub max_expansions: u32,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1000.0,
            tolerance: 1e-9,
            max_iterations: 200,
            max_expansions: 20,
        }
    }
}

impl SearchBounds {
    /// Check that the bounds describe a finite, non-empty interval
    pub fn validate(&self) -> Result<(), SearchError> {
        let usable = self.lower.is_finite()
            && self.upper.is_finite()
            && self.lower >= 0.0
            && self.lower < self.upper
            && self.tolerance > 0.0;
        if !usable {
            return Err(SearchError::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

/// Find the smallest value in the search interval for which `predicate`
/// holds, assuming the predicate is monotone (false below some threshold,
/// true at and above it).
///
/// The returned value always satisfies the predicate. Predicate errors are
/// propagated as-is and stop the search.
pub fn bisect_smallest<F, E>(mut predicate: F, bounds: &SearchBounds) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<bool, E>,
    E: From<SearchError>,
{
    bounds.validate()?;

    if predicate(bounds.lower)? {
        return Ok(bounds.lower);
    }

    let mut lo = bounds.lower;
    let mut hi = bounds.upper;
    let mut expansions = 0;
    while !predicate(hi)? {
        if expansions >= bounds.max_expansions {
            return Err(SearchError::Unsatisfiable { upper: hi }.into());
        }
        lo = hi;
        hi *= 2.0;
        expansions += 1;
    }

    let mut iterations = 0;
    while hi - lo > bounds.tolerance && iterations < bounds.max_iterations {
        let mid = lo + (hi - lo) / 2.0;
        if predicate(mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
        iterations += 1;
    }

    Ok(hi)
}

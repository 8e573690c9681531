//! Input Validation for Privacy Parameters
//!
//! Rejects parameters that would make a release meaningless before any
//! calibration work starts.
//!
//! # Parameter Constraints
//!
//! ## Epsilon (ε)
//! - Must be positive and finite
//! - Smaller = more private, but more noise
//!
//! ## Delta (δ)
//! - Must be in [0, 1)
//! - δ = 0 gives pure ε-DP, which is all the Laplace and geometric
//!   mechanisms need
//!
//! ## Confidence level
//! - Must be in (0, 1); the accuracy statement uses α = 1 − level

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum allowed epsilon (too small = unbounded noise scale)
pub const MIN_EPSILON: f64 = 1e-10;

/// Error type for privacy parameter validation
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ParameterError {
    #[error("invalid epsilon {value}: {reason}")]
    InvalidEpsilon { value: f64, reason: String },
    #[error("invalid delta {value}: {reason}")]
    InvalidDelta { value: f64, reason: String },
    #[error("invalid confidence level {value}: {reason}")]
    InvalidConfidenceLevel { value: f64, reason: String },
}

/// Validate an epsilon value
pub fn validate_epsilon(epsilon: f64) -> Result<(), ParameterError> {
    if !epsilon.is_finite() {
        return Err(ParameterError::InvalidEpsilon {
            value: epsilon,
            reason: "epsilon must be a finite number".to_string(),
        });
    }

    if epsilon <= 0.0 {
        return Err(ParameterError::InvalidEpsilon {
            value: epsilon,
            reason: "epsilon must be positive".to_string(),
        });
    }

    if epsilon < MIN_EPSILON {
        return Err(ParameterError::InvalidEpsilon {
            value: epsilon,
            reason: format!("epsilon too small (< {}): noise would be unbounded", MIN_EPSILON),
        });
    }

    Ok(())
}

/// Validate a delta value
pub fn validate_delta(delta: f64) -> Result<(), ParameterError> {
    if !delta.is_finite() {
        return Err(ParameterError::InvalidDelta {
            value: delta,
            reason: "delta must be a finite number".to_string(),
        });
    }

    if delta < 0.0 {
        return Err(ParameterError::InvalidDelta {
            value: delta,
            reason: "delta must be non-negative".to_string(),
        });
    }

    if delta >= 1.0 {
        return Err(ParameterError::InvalidDelta {
            value: delta,
            reason: "delta must be less than 1".to_string(),
        });
    }

    Ok(())
}

/// Validate a confidence level
pub fn validate_confidence_level(level: f64) -> Result<(), ParameterError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(ParameterError::InvalidConfidenceLevel {
            value: level,
            reason: "confidence level must be strictly between 0 and 1".to_string(),
        });
    }
    Ok(())
}

//! Noise sampling
//!
//! # Laplace
//!
//! Sampled by inverse CDF. For U ~ Uniform(-0.5, 0.5):
//!
//! ```text
//! X = -b · sign(U) · ln(1 − 2|U|)   ~ Laplace(0, b)
//! ```
//!
//! # Two-sided geometric
//!
//! The discrete analogue of Laplace, P(X = k) ∝ e^(−|k|/b). Sampled as the
//! difference of two one-sided geometric variables with success probability
//! 1 − e^(−1/b), each drawn as ⌊−b · ln U⌋ for U ~ Uniform(0, 1].

use super::MechanismError;
use rand::Rng;

/// Sample from Laplace(0, scale)
pub fn sample_laplace<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> Result<f64, MechanismError> {
    check_scale(scale)?;
    if scale == 0.0 {
        return Ok(0.0);
    }

    let u = loop {
        let u = rng.gen::<f64>() - 0.5;
        // Avoid exactly 0 (ln(1) gives no noise, and sign is undefined)
        if u.abs() > 1e-15 {
            break u;
        }
    };

    Ok(-scale * u.signum() * (1.0 - 2.0 * u.abs()).ln())
}

/// Sample from the two-sided geometric distribution with the given scale
pub fn sample_geometric<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> Result<i64, MechanismError> {
    check_scale(scale)?;
    if scale == 0.0 {
        return Ok(0);
    }
    Ok(one_sided_geometric(rng, scale) - one_sided_geometric(rng, scale))
}

fn one_sided_geometric<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> i64 {
    // 1 − [0, 1) = (0, 1], so ln never sees 0
    let u = 1.0 - rng.gen::<f64>();
    let draw = (-scale * u.ln()).floor();
    if draw >= i64::MAX as f64 {
        i64::MAX
    } else {
        draw as i64
    }
}

fn check_scale(scale: f64) -> Result<(), MechanismError> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(MechanismError::Execution(format!(
            "noise scale must be finite and non-negative, got {}",
            scale
        )));
    }
    Ok(())
}

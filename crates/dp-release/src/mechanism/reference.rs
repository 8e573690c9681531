//! Reference mechanism library
//!
//! # Sensitivity
//!
//! For input distance `d_in` (records changed):
//! - Count, count-by-categories: `d_in`
//! - Sum over clamped, resized data: `d_in · (max − min)`
//! - Mean over clamped, resized data: `d_in · (max − min) / n`
//!
//! # Privacy map
//!
//! Both the Laplace and the geometric mechanism with scale `b` are
//! `Δ/b`-DP for a query with sensitivity `Δ`, so a chain satisfies `ε`
//! when `Δ/b ≤ ε`. The map is non-increasing in `b`.
//!
//! # Accuracy
//!
//! - Laplace: P(|X| ≥ a) = e^(−a/b), so a = b · ln(1/α)
//! - Geometric: P(|X| ≥ a) = 2p^a / (1 + p) with p = e^(−1/b),
//!   so a = b · ln(2 / (α(1 + p)))

use super::noise::{sample_geometric, sample_laplace};
use super::{Chain, MechanismError, MechanismLibrary, NoiseKind, ReleaseValue};
use crate::chain::{Aggregation, ChainDescriptor, ChainStage};
use crate::variable::{InputValue, VariableType};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Built-in mechanism library
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    /// Fixed RNG seed for reproducible executions; `None` draws from entropy
    seed: Option<u64>,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library whose chains reuse the same seed on every execution
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl MechanismLibrary for ReferenceLibrary {
    type Chain = ReferenceChain;

    fn build_chain(&self, descriptor: &ChainDescriptor) -> Result<ReferenceChain, MechanismError> {
        descriptor.check_structure()?;
        let (noise, scale) = descriptor
            .noise()
            .ok_or_else(|| MechanismError::InvalidChain("missing noise stage".to_string()))?;
        let sensitivity = unit_sensitivity(descriptor)?;

        if matches!(
            descriptor.aggregation(),
            Some(Aggregation::Count | Aggregation::CountByCategories { .. })
        ) != (noise == NoiseKind::Geometric)
        {
            return Err(MechanismError::InvalidChain(format!(
                "{} noise does not fit the chain's aggregation",
                noise
            )));
        }

        Ok(ReferenceChain {
            descriptor: descriptor.clone(),
            sensitivity,
            noise,
            scale,
            seed: self.seed,
        })
    }

    fn scale_to_accuracy(
        &self,
        kind: NoiseKind,
        scale: f64,
        alpha: f64,
    ) -> Result<f64, MechanismError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(MechanismError::Accuracy(format!(
                "alpha must be in (0, 1), got {}",
                alpha
            )));
        }
        if !scale.is_finite() || scale < 0.0 {
            return Err(MechanismError::Accuracy(format!(
                "scale must be finite and non-negative, got {}",
                scale
            )));
        }
        if scale == 0.0 {
            return Ok(0.0);
        }

        let accuracy = match kind {
            NoiseKind::Laplace => scale * (1.0 / alpha).ln(),
            NoiseKind::Geometric => {
                let p = (-1.0 / scale).exp();
                scale * (2.0 / (alpha * (1.0 + p))).ln()
            }
        };
        Ok(accuracy.max(0.0))
    }
}

/// Sensitivity of the chain's aggregation for one changed record
fn unit_sensitivity(descriptor: &ChainDescriptor) -> Result<f64, MechanismError> {
    match descriptor.aggregation() {
        Some(Aggregation::Count) | Some(Aggregation::CountByCategories { .. }) => Ok(1.0),
        Some(Aggregation::Sum) => Ok(bounded_range(descriptor)?.0),
        Some(Aggregation::Mean) => {
            let (range, size) = bounded_range(descriptor)?;
            if size == 0 {
                return Err(MechanismError::InvalidChain(
                    "mean needs a positive dataset size".to_string(),
                ));
            }
            Ok(range / size as f64)
        }
        None => Err(MechanismError::InvalidChain("missing aggregation".to_string())),
    }
}

/// Clamp width and resize target of a bounded aggregation
fn bounded_range(descriptor: &ChainDescriptor) -> Result<(f64, u64), MechanismError> {
    let (min, max) = descriptor.clamp_bounds().ok_or_else(|| {
        MechanismError::InvalidChain("sums and means need a clamp stage".to_string())
    })?;
    let size = descriptor.resize_size().ok_or_else(|| {
        MechanismError::InvalidChain("sums and means need a resize stage".to_string())
    })?;
    Ok((max - min, size))
}

/// A chain built by [`ReferenceLibrary`]
#[derive(Debug, Clone)]
pub struct ReferenceChain {
    descriptor: ChainDescriptor,
    sensitivity: f64,
    noise: NoiseKind,
    scale: f64,
    seed: Option<u64>,
}

impl ReferenceChain {
    pub fn descriptor(&self) -> &ChainDescriptor {
        &self.descriptor
    }

    pub fn noise(&self) -> (NoiseKind, f64) {
        (self.noise, self.scale)
    }

    /// Sensitivity of the aggregation for one changed record
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Privacy loss for inputs at distance `d_in`
    pub fn privacy_loss(&self, d_in: u32) -> f64 {
        if self.scale == 0.0 {
            return f64::INFINITY;
        }
        f64::from(d_in) * self.sensitivity / self.scale
    }

    fn rng(&self) -> ChaCha20Rng {
        match self.seed {
            Some(s) => ChaCha20Rng::seed_from_u64(s),
            None => ChaCha20Rng::from_entropy(),
        }
    }
}

impl Chain for ReferenceChain {
    fn satisfies(&self, d_in: u32, epsilon: f64) -> Result<bool, MechanismError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(MechanismError::InvalidChain(format!(
                "epsilon must be positive and finite, got {}",
                epsilon
            )));
        }
        Ok(self.privacy_loss(d_in) <= epsilon)
    }

    fn execute(&self, records: &[Vec<String>]) -> Result<ReleaseValue, MechanismError> {
        let mut rng = self.rng();
        let mut cells: Vec<Cell> = Vec::new();
        let mut aggregate: Option<ReleaseValue> = None;

        for stage in self.descriptor.stages() {
            match stage {
                ChainStage::SelectColumn { index, .. } => {
                    cells = records
                        .iter()
                        .map(|row| match row.get(*index).map(|c| c.trim()) {
                            Some(c) if !c.is_empty() => Cell::Text(c.to_string()),
                            _ => Cell::Missing,
                        })
                        .collect();
                }
                ChainStage::Cast { to } => {
                    for cell in &mut cells {
                        *cell = cell.cast(*to);
                    }
                }
                ChainStage::DropMissing => cells.retain(|c| !matches!(c, Cell::Missing)),
                ChainStage::ImputeConstant { value } => {
                    let fill = match value {
                        InputValue::Integer(v) => Cell::Number(*v as f64),
                        InputValue::Float(v) => Cell::Number(*v),
                        InputValue::Text(s) => Cell::Text(s.clone()),
                    };
                    fill_missing(&mut cells, || fill.clone());
                }
                ChainStage::ImputeUniform { min, max, integer } => {
                    if !(min <= max) {
                        return Err(MechanismError::Execution(format!(
                            "cannot impute uniformly from [{}, {}]",
                            min, max
                        )));
                    }
                    fill_missing(&mut cells, || {
                        let v = rng.gen_range(*min..=*max);
                        Cell::Number(if *integer { v.round() } else { v })
                    });
                }
                ChainStage::ImputeCategory { categories } => {
                    if categories.is_empty() {
                        return Err(MechanismError::Execution(
                            "cannot impute from an empty category set".to_string(),
                        ));
                    }
                    fill_missing(&mut cells, || {
                        Cell::Text(categories[rng.gen_range(0..categories.len())].clone())
                    });
                }
                ChainStage::Clamp { min, max } => {
                    for cell in &mut cells {
                        if let Cell::Number(v) = cell {
                            *v = v.clamp(*min, *max);
                        }
                    }
                }
                ChainStage::Resize { size, constant } => {
                    let size = usize::try_from(*size).map_err(|_| {
                        MechanismError::Execution(format!("resize target {} is too large", size))
                    })?;
                    if cells.len() > size {
                        cells.shuffle(&mut rng);
                        cells.truncate(size);
                    } else {
                        cells.resize(size, Cell::Number(*constant));
                    }
                }
                ChainStage::BinByEdges { edges, labels } => {
                    for cell in &mut cells {
                        let binned = match &*cell {
                            Cell::Number(v) => {
                                let upper = edges.partition_point(|e| e <= v);
                                if upper == 0 || upper == edges.len() {
                                    Cell::Missing
                                } else {
                                    labels
                                        .get(upper - 1)
                                        .map(|l| Cell::Text(l.clone()))
                                        .unwrap_or(Cell::Missing)
                                }
                            }
                            _ => Cell::Missing,
                        };
                        *cell = binned;
                    }
                }
                ChainStage::Aggregate { aggregation } => {
                    aggregate = Some(aggregate_cells(&cells, aggregation)?);
                }
                ChainStage::AddNoise { mechanism, scale } => {
                    let value = aggregate.take().ok_or_else(|| {
                        MechanismError::Execution("noise stage reached before aggregation".to_string())
                    })?;
                    aggregate = Some(add_noise(&mut rng, value, *mechanism, *scale)?);
                }
            }
        }

        aggregate.ok_or_else(|| MechanismError::Execution("chain produced no value".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    fn cast(&self, to: VariableType) -> Cell {
        match (self, to) {
            (Cell::Missing, _) => Cell::Missing,
            (Cell::Text(s), VariableType::Categorical) => Cell::Text(s.clone()),
            (Cell::Number(v), VariableType::Categorical) => Cell::Text(v.to_string()),
            (Cell::Text(s), VariableType::Float) => match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Cell::Number(v),
                _ => Cell::Missing,
            },
            (Cell::Text(s), VariableType::Integer) => match s.parse::<i64>() {
                Ok(v) => Cell::Number(v as f64),
                Err(_) => match s.parse::<f64>() {
                    Ok(v) if v.is_finite() && v.fract() == 0.0 => Cell::Number(v),
                    _ => Cell::Missing,
                },
            },
            (Cell::Number(v), VariableType::Float) => Cell::Number(*v),
            (Cell::Number(v), VariableType::Integer) => Cell::Number(v.trunc()),
        }
    }

    /// Category key used when counting by categories
    fn key(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) if v.fract() == 0.0 => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
        }
    }
}

fn fill_missing(cells: &mut [Cell], mut fill: impl FnMut() -> Cell) {
    for cell in cells.iter_mut() {
        if matches!(cell, Cell::Missing) {
            *cell = fill();
        }
    }
}

fn aggregate_cells(cells: &[Cell], aggregation: &Aggregation) -> Result<ReleaseValue, MechanismError> {
    let numbers = || {
        cells.iter().filter_map(|c| match c {
            Cell::Number(v) => Some(*v),
            _ => None,
        })
    };

    match aggregation {
        Aggregation::Count => Ok(ReleaseValue::Integer(cells.len() as i64)),
        Aggregation::Sum => Ok(ReleaseValue::Float(numbers().sum())),
        Aggregation::Mean => {
            if cells.is_empty() {
                return Err(MechanismError::Execution("mean over no records".to_string()));
            }
            Ok(ReleaseValue::Float(numbers().sum::<f64>() / cells.len() as f64))
        }
        Aggregation::CountByCategories {
            categories,
            null_category,
        } => {
            let mut counts = vec![0i64; categories.len() + usize::from(*null_category)];
            for cell in cells {
                let slot = cell
                    .key()
                    .and_then(|k| categories.iter().position(|c| *c == k));
                match slot {
                    Some(i) => counts[i] += 1,
                    None if *null_category => counts[categories.len()] += 1,
                    None => {}
                }
            }
            Ok(ReleaseValue::Counts(counts))
        }
    }
}

fn add_noise<R: Rng + ?Sized>(
    rng: &mut R,
    value: ReleaseValue,
    mechanism: NoiseKind,
    scale: f64,
) -> Result<ReleaseValue, MechanismError> {
    match (value, mechanism) {
        (ReleaseValue::Float(v), NoiseKind::Laplace) => {
            Ok(ReleaseValue::Float(v + sample_laplace(rng, scale)?))
        }
        (ReleaseValue::Integer(v), NoiseKind::Geometric) => {
            Ok(ReleaseValue::Integer(v.saturating_add(sample_geometric(rng, scale)?)))
        }
        (ReleaseValue::Counts(counts), NoiseKind::Geometric) => {
            let mut noisy = Vec::with_capacity(counts.len());
            for count in counts {
                noisy.push(count.saturating_add(sample_geometric(rng, scale)?));
            }
            Ok(ReleaseValue::Counts(noisy))
        }
        (value, mechanism) => Err(MechanismError::Execution(format!(
            "{} noise cannot be added to {:?}",
            mechanism, value
        ))),
    }
}

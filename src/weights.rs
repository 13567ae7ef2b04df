use rand::distributions::Uniform;
use rand::Rng;
use thiserror::Error;

use crate::consts::{DEGENERATE_THRESHOLD, FLOAT_COMPARISON_EPSILON};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Weight vector size must be > 0")]
    EmptyVector,
    #[error("Cannot normalize: sum ({0}) is numerically zero or negative")]
    DegenerateNormalization(f64),
    #[error("Vector sizes must match ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
}

/// Equal allocation across `n` assets.
pub fn uniform_weights(n: usize) -> Vec<f64> {
    vec![1. / n as f64; n]
}

/// Draws each gene uniformly in `[0, 1)` and normalizes to a unit sum.
/// Falls back to the uniform allocation when the raw draw sums to zero.
pub fn random_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Vec<f64>, WeightError> {
    if n == 0 {
        return Err(WeightError::EmptyVector);
    }

    let uniform = Uniform::new(0., 1.);
    let mut weights = (0..n).map(|_| rng.sample(uniform)).collect::<Vec<f64>>();
    let magnitude = weights.iter().sum::<f64>();

    if magnitude < DEGENERATE_THRESHOLD {
        return Ok(uniform_weights(n));
    }
    weights.iter_mut().for_each(|w| *w /= magnitude);
    Ok(weights)
}

/// Clamps every weight into `[lower, upper]`.
pub fn clip_weights(weights: &mut [f64], lower: f64, upper: f64) {
    for weight in weights.iter_mut() {
        *weight = weight.max(lower).min(upper);
    }
}

/// Rescales the weights to sum to one.
pub fn normalize(weights: &mut [f64]) -> Result<(), WeightError> {
    let total = weights.iter().sum::<f64>();
    // also rejects NaN sums
    if !(total >= DEGENERATE_THRESHOLD) {
        return Err(WeightError::DegenerateNormalization(total));
    }
    weights.iter_mut().for_each(|w| *w /= total);
    Ok(())
}

pub fn dot_product(a: &[f64], b: &[f64]) -> Result<f64, WeightError> {
    if a.len() != b.len() {
        return Err(WeightError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

pub fn almost_equal(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}

/// Elementwise [`almost_equal`] with the default feasibility tolerance.
pub fn weights_almost_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(&x, &y)| almost_equal(x, y, FLOAT_COMPARISON_EPSILON))
}

//! Feasibility checks and the continuous penalty used by the search.
//!
//! The boolean checks and the penalty share one tolerance
//! ([`FLOAT_COMPARISON_EPSILON`]) so that `penalty(..) == 0.0` exactly when
//! `is_feasible(..)` holds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{FLOAT_COMPARISON_EPSILON, TARGET_SIZE_MISMATCH_PENALTY};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    #[error("Weights must sum to 1.0. Got sum = {sum}")]
    SumNotOne { sum: f64 },
    #[error("Weight {weight} at index {index} violates bounds [{lower}, {upper}]")]
    OutOfBounds {
        index: usize,
        weight: f64,
        lower: f64,
        upper: f64,
    },
    #[error("Expected return ({expected}) is below target ({target})")]
    BelowTarget { expected: f64, target: f64 },
    #[error("Weight and return vectors must match in size ({weights} vs {means})")]
    SizeMismatch { weights: usize, means: usize },
}

/// Uniform weight bounds plus an optional floor on expected return.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ConstraintConfig {
    #[serde(default)]
    pub lower_bound: f64,
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,
    /// `None` means no return constraint.
    #[serde(default)]
    pub target_return: Option<f64>,
}

fn default_upper_bound() -> f64 {
    1.0
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        ConstraintConfig {
            lower_bound: 0.0,
            upper_bound: default_upper_bound(),
            target_return: None,
        }
    }
}

impl ConstraintConfig {
    pub fn validate_weights(
        &self,
        weights: &[f64],
        mean_returns: &[f64],
    ) -> Result<(), ConstraintViolation> {
        validate_weights(
            weights,
            mean_returns,
            self.lower_bound,
            self.upper_bound,
            self.target_return,
        )
    }

    pub fn is_feasible(&self, weights: &[f64], mean_returns: &[f64]) -> bool {
        self.validate_weights(weights, mean_returns).is_ok()
    }

    pub fn penalty(&self, weights: &[f64], mean_returns: &[f64]) -> f64 {
        penalty(
            weights,
            mean_returns,
            self.lower_bound,
            self.upper_bound,
            self.target_return,
        )
    }
}

pub fn sum_to_one(weights: &[f64]) -> Result<(), ConstraintViolation> {
    let sum = weights.iter().sum::<f64>();
    if (sum - 1.0).abs() <= FLOAT_COMPARISON_EPSILON {
        Ok(())
    } else {
        Err(ConstraintViolation::SumNotOne { sum })
    }
}

pub fn bounds(weights: &[f64], lower: f64, upper: f64) -> Result<(), ConstraintViolation> {
    match weights.iter().enumerate().find(|(_, &w)| {
        w < lower - FLOAT_COMPARISON_EPSILON || w > upper + FLOAT_COMPARISON_EPSILON
    }) {
        Some((index, &weight)) => Err(ConstraintViolation::OutOfBounds {
            index,
            weight,
            lower,
            upper,
        }),
        None => Ok(()),
    }
}

pub fn target_return(
    weights: &[f64],
    mean_returns: &[f64],
    target: f64,
) -> Result<(), ConstraintViolation> {
    let expected = expected_return(weights, mean_returns)?;
    if expected + FLOAT_COMPARISON_EPSILON < target {
        return Err(ConstraintViolation::BelowTarget { expected, target });
    }
    Ok(())
}

/// Runs every check, returning the first violation found.
pub fn validate_weights(
    weights: &[f64],
    mean_returns: &[f64],
    lower: f64,
    upper: f64,
    target: Option<f64>,
) -> Result<(), ConstraintViolation> {
    sum_to_one(weights)?;
    bounds(weights, lower, upper)?;
    if let Some(target) = target {
        target_return(weights, mean_returns, target)?;
    }
    Ok(())
}

pub fn is_feasible(
    weights: &[f64],
    mean_returns: &[f64],
    lower: f64,
    upper: f64,
    target: Option<f64>,
) -> bool {
    validate_weights(weights, mean_returns, lower, upper, target).is_ok()
}

/// `|sum - 1|`, or zero when within tolerance.
pub fn sum_deviation(weights: &[f64]) -> f64 {
    let deviation = (weights.iter().sum::<f64>() - 1.0).abs();
    if deviation <= FLOAT_COMPARISON_EPSILON {
        0.0
    } else {
        deviation
    }
}

/// Total distance of the weights outside `[lower, upper]`.
pub fn bounds_violation(weights: &[f64], lower: f64, upper: f64) -> f64 {
    weights
        .iter()
        .map(|&w| {
            if w < lower - FLOAT_COMPARISON_EPSILON {
                lower - w
            } else if w > upper + FLOAT_COMPARISON_EPSILON {
                w - upper
            } else {
                0.0
            }
        })
        .sum()
}

/// How far the expected return falls short of `target`.
pub fn target_shortfall(weights: &[f64], mean_returns: &[f64], target: Option<f64>) -> f64 {
    let Some(target) = target else {
        return 0.0;
    };
    match expected_return(weights, mean_returns) {
        Err(_) => TARGET_SIZE_MISMATCH_PENALTY,
        Ok(expected) if expected + FLOAT_COMPARISON_EPSILON < target => target - expected,
        Ok(_) => 0.0,
    }
}

/// Non-negative measure of infeasibility; zero iff the weights are feasible.
pub fn penalty(
    weights: &[f64],
    mean_returns: &[f64],
    lower: f64,
    upper: f64,
    target: Option<f64>,
) -> f64 {
    sum_deviation(weights)
        + bounds_violation(weights, lower, upper)
        + target_shortfall(weights, mean_returns, target)
}

fn expected_return(weights: &[f64], mean_returns: &[f64]) -> Result<f64, ConstraintViolation> {
    if weights.len() != mean_returns.len() {
        return Err(ConstraintViolation::SizeMismatch {
            weights: weights.len(),
            means: mean_returns.len(),
        });
    }
    Ok(weights.iter().zip(mean_returns).map(|(w, m)| w * m).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{normalize, random_weights};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    const MEANS: [f64; 3] = [0.001, 0.002, 0.0015];

    #[test]
    fn individual_checks() {
        assert!(sum_to_one(&[0.5, 0.5]).is_ok());
        assert!(sum_to_one(&[0.5, 0.5 + 5e-9]).is_ok());
        assert!(matches!(
            sum_to_one(&[0.5, 0.6]),
            Err(ConstraintViolation::SumNotOne { sum }) if (sum - 1.1).abs() < 1e-12
        ));

        assert!(bounds(&[0.0, 1.0], 0.0, 1.0).is_ok());
        assert!(bounds(&[-5e-9, 1.0], 0.0, 1.0).is_ok());
        assert!(matches!(
            bounds(&[0.2, -0.1], 0.0, 1.0),
            Err(ConstraintViolation::OutOfBounds { index: 1, .. })
        ));

        assert!(target_return(&[0.0, 1.0, 0.0], &MEANS, 0.002).is_ok());
        assert!(matches!(
            target_return(&[1.0, 0.0, 0.0], &MEANS, 0.002),
            Err(ConstraintViolation::BelowTarget { .. })
        ));
        assert_eq!(
            target_return(&[1.0], &MEANS, 0.0),
            Err(ConstraintViolation::SizeMismatch {
                weights: 1,
                means: 3
            })
        );
    }

    #[test]
    fn feasibility_swallows_errors() {
        assert!(is_feasible(&[0.2, 0.3, 0.5], &MEANS, 0.0, 1.0, None));
        assert!(!is_feasible(&[0.5, 0.5], &MEANS, 0.0, 1.0, Some(0.0)));
        // without a target the size mismatch is never looked at
        assert!(is_feasible(&[0.5, 0.5], &MEANS, 0.0, 1.0, None));
    }

    #[test]
    fn penalty_terms() {
        assert_eq!(penalty(&[0.2, 0.3, 0.5], &MEANS, 0.0, 1.0, None), 0.0);

        let p = penalty(&[0.5, 0.7, 0.0], &MEANS, 0.0, 1.0, None);
        assert!((p - 0.2).abs() < 1e-12);

        let p = penalty(&[1.2, -0.2, 0.0], &MEANS, 0.0, 1.0, None);
        assert!((p - 0.4).abs() < 1e-12);

        let p = penalty(&[1.0, 0.0, 0.0], &MEANS, 0.0, 1.0, Some(0.003));
        assert!((p - 0.002).abs() < 1e-12);

        let p = penalty(&[1.0], &MEANS, 0.0, 1.0, Some(0.003));
        assert_eq!(p, TARGET_SIZE_MISMATCH_PENALTY);
    }

    #[test]
    fn penalty_is_zero_iff_feasible() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..2000 {
            let n = rng.gen_range(1..6);
            let means: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.002..0.004)).collect();
            let mut weights = random_weights(n, &mut rng).unwrap();

            // perturb some candidates so both branches are exercised
            match rng.gen_range(0..4) {
                0 => weights[0] += rng.gen_range(-0.3..0.3),
                1 => weights.iter_mut().for_each(|w| *w *= 1.5),
                2 => {
                    weights[0] -= 0.4;
                    let _ = normalize(&mut weights);
                }
                _ => {}
            }
            let lower = if rng.gen_bool(0.5) { 0.0 } else { -0.1 };
            let upper = rng.gen_range(0.3..1.2);
            let target = rng.gen_bool(0.5).then(|| rng.gen_range(-0.001..0.003));

            let p = penalty(&weights, &means, lower, upper, target);
            let feasible = is_feasible(&weights, &means, lower, upper, target);
            assert!(p >= 0.0);
            assert_eq!(
                p == 0.0,
                feasible,
                "weights {:?}, bounds [{}, {}], target {:?}, penalty {}",
                weights,
                lower,
                upper,
                target,
                p
            );
        }
    }

    #[test]
    fn config_defaults_and_delegation() {
        let config = ConstraintConfig::default();
        assert_eq!(config.lower_bound, 0.0);
        assert_eq!(config.upper_bound, 1.0);
        assert_eq!(config.target_return, None);

        let parsed: ConstraintConfig = serde_json::from_str(r#"{"target_return": 0.002}"#).unwrap();
        assert_eq!(parsed.upper_bound, 1.0);
        assert!(parsed.is_feasible(&[0.0, 1.0, 0.0], &MEANS));
        assert!(parsed.penalty(&[1.0, 0.0, 0.0], &MEANS) > 0.0);
    }
}

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constraints::{bounds_violation, sum_deviation, target_shortfall, ConstraintConfig};
use crate::portfolio::{PortfolioError, PortfolioModel};

fn default_sum_penalty_multiplier() -> f64 {
    100.0
}

fn default_bounds_penalty_multiplier() -> f64 {
    100.0
}

fn default_target_return_penalty_multiplier() -> f64 {
    1000.0
}

/// Penalty multipliers and the per-period risk-free rate used by the fitness.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FitnessConfig {
    #[serde(default = "default_sum_penalty_multiplier")]
    pub sum_penalty_multiplier: f64,
    #[serde(default = "default_bounds_penalty_multiplier")]
    pub bounds_penalty_multiplier: f64,
    #[serde(default = "default_target_return_penalty_multiplier")]
    pub target_return_penalty_multiplier: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        FitnessConfig {
            sum_penalty_multiplier: default_sum_penalty_multiplier(),
            bounds_penalty_multiplier: default_bounds_penalty_multiplier(),
            target_return_penalty_multiplier: default_target_return_penalty_multiplier(),
            risk_free_rate: 0.0,
        }
    }
}

/// Negative Sharpe ratio plus weighted constraint penalties. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenalisedSharpe {
    pub constraints: ConstraintConfig,
    pub fitness: FitnessConfig,
}

impl PenalisedSharpe {
    pub fn new(constraints: ConstraintConfig, fitness: FitnessConfig) -> Self {
        PenalisedSharpe {
            constraints,
            fitness,
        }
    }

    pub fn total_penalty(&self, model: &PortfolioModel, weights: &[f64]) -> f64 {
        let ConstraintConfig {
            lower_bound,
            upper_bound,
            target_return,
        } = self.constraints;

        sum_deviation(weights) * self.fitness.sum_penalty_multiplier
            + bounds_violation(weights, lower_bound, upper_bound)
                * self.fitness.bounds_penalty_multiplier
            + target_shortfall(weights, model.means(), target_return)
                * self.fitness.target_return_penalty_multiplier
    }

    /// An infinite Sharpe ratio maps to `-inf` (best possible) and a NaN one
    /// to `f64::MAX` (worst finite value) so fitness values stay ordered.
    pub fn evaluate(&self, model: &PortfolioModel, weights: &[f64]) -> Result<f64, PortfolioError> {
        let sharpe = model.sharpe_ratio(weights, self.fitness.risk_free_rate)?;

        if sharpe == f64::INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        if sharpe.is_nan() {
            warn!(?weights, "Sharpe ratio is NaN, assigning worst fitness");
            return Ok(f64::MAX);
        }
        Ok(-sharpe + self.total_penalty(model, weights))
    }
}

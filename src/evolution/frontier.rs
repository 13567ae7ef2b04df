use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constraints::ConstraintConfig;
use crate::evolution::{EvolutionError, GeneticConfig, GeneticOptimiser};
use crate::portfolio::PortfolioModel;

fn default_points() -> usize {
    20
}

fn default_max_target_return() -> f64 {
    0.005
}

/// Sweep over target returns `0, max/(points-1), ..., max`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FrontierConfig {
    #[serde(default = "default_points")]
    pub points: usize,
    /// Per-period return targeted by the last point.
    #[serde(default = "default_max_target_return")]
    pub max_target_return: f64,
    /// Point `i` is optimised with seed `seed + i`. Falls back to the base config's seed.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Replaces the base config's target-return multiplier for targeted points.
    #[serde(default)]
    pub target_return_penalty_multiplier: Option<f64>,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        FrontierConfig {
            points: default_points(),
            max_target_return: default_max_target_return(),
            seed: None,
            target_return_penalty_multiplier: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrontierPoint {
    /// `None` for the unconstrained maximum-Sharpe run.
    pub target_return: Option<f64>,
    pub risk: f64,
    pub expected_return: f64,
    pub sharpe_ratio: f64,
    pub weights: Vec<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EfficientFrontier {
    /// Sorted by increasing risk.
    pub points: Vec<FrontierPoint>,
    pub best_sharpe: FrontierPoint,
}

/// Optimiser settings for sweep point `i`: its target, its seed and the
/// frontier's target multiplier, if any.
fn point_config(base: &GeneticConfig, frontier: &FrontierConfig, i: usize) -> GeneticConfig {
    let target_return = (i > 0)
        .then(|| i as f64 * frontier.max_target_return / (frontier.points - 1) as f64);
    let mut config = GeneticConfig {
        constraints: ConstraintConfig {
            target_return,
            ..base.constraints
        },
        global_seed: frontier
            .seed
            .or(base.global_seed)
            .map(|seed| seed.wrapping_add(i as u64)),
        ..base.clone()
    };
    if let Some(multiplier) = frontier.target_return_penalty_multiplier {
        config.fitness.target_return_penalty_multiplier = multiplier;
    }
    config
}

/// Runs one fresh optimiser per target return and collects the resulting
/// risk/return pairs. The first run carries no target at all.
pub fn efficient_frontier(
    model: &PortfolioModel,
    base: &GeneticConfig,
    frontier: &FrontierConfig,
) -> Result<EfficientFrontier, EvolutionError> {
    if frontier.points == 0 {
        return Err(EvolutionError::BadFrontierParameter(
            "Frontier needs at least one point".into(),
        ));
    }
    if !frontier.max_target_return.is_finite() {
        return Err(EvolutionError::BadFrontierParameter(format!(
            "Maximum target return must be finite, got {}",
            frontier.max_target_return
        )));
    }

    let risk_free = base.fitness.risk_free_rate;
    let mut points = Vec::with_capacity(frontier.points);

    for i in 0..frontier.points {
        let config = point_config(base, frontier, i);
        let target_return = config.constraints.target_return;
        let weights = GeneticOptimiser::new(model, config)?.optimise()?;
        let point = FrontierPoint {
            target_return,
            risk: model.portfolio_risk(&weights)?,
            expected_return: model.portfolio_return(&weights)?,
            sharpe_ratio: model.sharpe_ratio(&weights, risk_free)?,
            weights,
        };
        info!(
            point = i + 1,
            points = frontier.points,
            target = ?point.target_return,
            risk = point.risk,
            expected_return = point.expected_return,
            "Frontier point optimised"
        );
        points.push(point);
    }

    // first point wins ties
    let Some(best_sharpe) = points
        .iter()
        .reduce(|best, p| if p.sharpe_ratio > best.sharpe_ratio { p } else { best })
        .cloned()
    else {
        return Err(EvolutionError::BadFrontierParameter(
            "Frontier produced no points".into(),
        ));
    };
    points.sort_by(|a, b| a.risk.total_cmp(&b.risk));

    Ok(EfficientFrontier {
        points,
        best_sharpe,
    })
}

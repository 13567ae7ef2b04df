use serde::{Deserialize, Serialize};

use crate::consts::DEGENERATE_THRESHOLD;
use crate::portfolio::{PortfolioError, PortfolioModel};
use crate::weights::WeightError;

/// Return, risk and Sharpe ratio of an allocation, scaled to a reporting horizon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
    pub weights: Vec<f64>,
}

impl PortfolioPerformance {
    /// Per-period figures, with `risk_free` given per period.
    pub fn new(
        model: &PortfolioModel,
        weights: &[f64],
        risk_free: f64,
    ) -> Result<Self, PortfolioError> {
        Self::annualized(model, weights, risk_free, 1.0)
    }

    /// Scales return by `P`, risk and Sharpe ratio by `sqrt(P)` where `P` is
    /// `periods_per_year`. `risk_free` stays a per-period rate.
    pub fn annualized(
        model: &PortfolioModel,
        weights: &[f64],
        risk_free: f64,
        periods_per_year: f64,
    ) -> Result<Self, PortfolioError> {
        let scale = periods_per_year.sqrt();
        Ok(PortfolioPerformance {
            expected_return: model.portfolio_return(weights)? * periods_per_year,
            risk: model.portfolio_risk(weights)? * scale,
            sharpe_ratio: model.sharpe_ratio(weights, risk_free)? * scale,
            weights: weights.to_vec(),
        })
    }
}

/// Fully invested allocation with the lowest variance when short positions
/// are allowed: `Cov^-1 * 1 / (1^T * Cov^-1 * 1)`.
pub fn minimum_variance_weights(model: &PortfolioModel) -> Result<Vec<f64>, PortfolioError> {
    let inverse = model.covariance().inverse()?;
    let n = model.num_assets();

    let row_sums: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| inverse[(i, j)]).sum())
        .collect();
    let total: f64 = row_sums.iter().sum();
    if total.abs() < DEGENERATE_THRESHOLD {
        return Err(WeightError::DegenerateNormalization(total).into());
    }
    Ok(row_sums.into_iter().map(|w| w / total).collect())
}

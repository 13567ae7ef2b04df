use thiserror::Error;
use tracing::debug;

use crate::consts::DEGENERATE_THRESHOLD;
use crate::linalg::{Matrix, MatrixError};
use crate::weights::WeightError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Returns table requires at least 2 rows of data, got {0}")]
    InsufficientData(usize),
    #[error("Returns table requires at least 1 asset column")]
    NoAssets,
    #[error("Weight vector size mismatch for {operation}. Expected {expected}, got {found}")]
    DimensionMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Weights(#[from] WeightError),
}

/// Mean/covariance model of a returns table (rows are periods, columns are assets).
///
/// Statistics are computed once on construction; every query afterwards is a
/// read-only function of a weight vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioModel {
    returns: Matrix,
    num_assets: usize,
    means: Vec<f64>,
    covariance: Matrix,
}

impl PortfolioModel {
    pub fn new(returns: Matrix) -> Result<Self, PortfolioError> {
        if returns.num_rows() < 2 {
            return Err(PortfolioError::InsufficientData(returns.num_rows()));
        }
        let num_assets = returns.num_cols();
        if num_assets == 0 {
            return Err(PortfolioError::NoAssets);
        }

        let means = returns.mean_per_column();
        let covariance = returns.covariance_matrix()?;
        debug!(
            periods = returns.num_rows(),
            assets = num_assets,
            "Built portfolio model"
        );

        Ok(PortfolioModel {
            returns,
            num_assets,
            means,
            covariance,
        })
    }

    /// Convenience constructor from row vectors; ragged tables are rejected.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, PortfolioError> {
        Self::new(Matrix::from_rows(rows)?)
    }

    pub fn num_assets(&self) -> usize {
        self.num_assets
    }

    pub fn num_periods(&self) -> usize {
        self.returns.num_rows()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    pub fn returns(&self) -> &Matrix {
        &self.returns
    }

    fn check_len(&self, weights: &[f64], operation: &'static str) -> Result<(), PortfolioError> {
        if weights.len() != self.num_assets {
            return Err(PortfolioError::DimensionMismatch {
                operation,
                expected: self.num_assets,
                found: weights.len(),
            });
        }
        Ok(())
    }

    pub fn portfolio_return(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        self.check_len(weights, "portfolio return")?;
        Ok(weights.iter().zip(&self.means).map(|(w, m)| w * m).sum())
    }

    pub fn excess_return(&self, weights: &[f64], risk_free: f64) -> Result<f64, PortfolioError> {
        Ok(self.portfolio_return(weights)? - risk_free)
    }

    /// `w^T * Cov * w`, summed term by term.
    pub fn portfolio_variance(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        self.check_len(weights, "portfolio variance")?;
        let mut variance = 0.0;
        for (i, w_i) in weights.iter().enumerate() {
            for (j, w_j) in weights.iter().enumerate() {
                variance += w_i * w_j * self.covariance[(i, j)];
            }
        }
        Ok(variance)
    }

    /// Standard deviation of portfolio returns. Small negative variances from
    /// rounding are clamped to zero.
    pub fn portfolio_risk(&self, weights: &[f64]) -> Result<f64, PortfolioError> {
        Ok(self.portfolio_variance(weights)?.max(0.0).sqrt())
    }

    /// `(return - risk_free) / risk`.
    ///
    /// At (numerically) zero risk this is `+inf` for a strictly positive excess
    /// return and `0.0` otherwise, never `-inf`.
    pub fn sharpe_ratio(&self, weights: &[f64], risk_free: f64) -> Result<f64, PortfolioError> {
        let excess = self.excess_return(weights, risk_free)?;
        let risk = self.portfolio_risk(weights)?;

        if risk < DEGENERATE_THRESHOLD {
            if excess > DEGENERATE_THRESHOLD {
                return Ok(f64::INFINITY);
            }
            return Ok(0.0);
        }
        Ok(excess / risk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_asset_model() -> PortfolioModel {
        PortfolioModel::from_rows(&[
            vec![0.01, 0.02],
            vec![0.03, 0.00],
            vec![-0.01, 0.04],
        ])
        .unwrap()
    }

    #[test]
    fn construction_validates_the_table() {
        assert_eq!(
            PortfolioModel::from_rows(&[vec![0.1, 0.2]]).unwrap_err(),
            PortfolioError::InsufficientData(1)
        );
        assert_eq!(
            PortfolioModel::from_rows(&[vec![], vec![]]).unwrap_err(),
            PortfolioError::NoAssets
        );
        assert!(matches!(
            PortfolioModel::from_rows(&[vec![0.1, 0.2], vec![0.1]]),
            Err(PortfolioError::Matrix(MatrixError::NonRectangular { .. }))
        ));
    }

    #[test]
    fn statistics_are_cached() {
        let model = two_asset_model();
        assert_eq!(model.num_assets(), 2);
        assert_eq!(model.num_periods(), 3);
        assert_abs_diff_eq!(model.means()[0], 0.01, epsilon = 1e-15);
        assert_abs_diff_eq!(model.means()[1], 0.02, epsilon = 1e-15);

        let cov = model.covariance();
        assert_abs_diff_eq!(cov[(0, 0)], 0.0004, epsilon = 1e-15);
        assert_abs_diff_eq!(cov[(1, 1)], 0.0004, epsilon = 1e-15);
        assert_abs_diff_eq!(cov[(0, 1)], -0.0004, epsilon = 1e-15);
        assert_eq!(cov[(0, 1)], cov[(1, 0)]);
    }

    #[test]
    fn return_variance_and_risk() {
        let model = two_asset_model();
        let weights = [0.25, 0.75];

        assert_abs_diff_eq!(model.portfolio_return(&weights).unwrap(), 0.0175, epsilon = 1e-15);
        assert_abs_diff_eq!(
            model.excess_return(&weights, 0.0075).unwrap(),
            0.01,
            epsilon = 1e-15
        );
        // 0.0004 * (0.0625 + 0.5625 - 2 * 0.1875)
        assert_abs_diff_eq!(model.portfolio_variance(&weights).unwrap(), 0.0001, epsilon = 1e-15);
        assert_abs_diff_eq!(model.portfolio_risk(&weights).unwrap(), 0.01, epsilon = 1e-12);
        assert_abs_diff_eq!(model.sharpe_ratio(&weights, 0.0075).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let model = two_asset_model();
        assert!(matches!(
            model.portfolio_return(&[1.0]),
            Err(PortfolioError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
        assert!(model.portfolio_variance(&[0.3, 0.3, 0.4]).is_err());
        assert!(model.sharpe_ratio(&[1.0], 0.0).is_err());
    }

    #[test]
    fn sharpe_at_zero_risk() {
        // perfectly hedged: the two assets move in opposite directions
        let model = PortfolioModel::from_rows(&[
            vec![0.5, 0.5],
            vec![0.75, 0.25],
            vec![0.25, 0.75],
        ])
        .unwrap();
        let hedged = [0.5, 0.5];
        assert_eq!(model.portfolio_risk(&hedged).unwrap(), 0.0);

        assert_eq!(model.sharpe_ratio(&hedged, 0.0).unwrap(), f64::INFINITY);
        assert_eq!(model.sharpe_ratio(&hedged, 0.5).unwrap(), 0.0);
        assert_eq!(model.sharpe_ratio(&hedged, 1.0).unwrap(), 0.0);
    }

    #[test]
    fn constant_returns_have_zero_risk() {
        let model = PortfolioModel::from_rows(&[vec![0.001], vec![0.001], vec![0.001]]).unwrap();
        assert!(model.portfolio_risk(&[1.0]).unwrap() < 1e-12);
        assert_eq!(model.sharpe_ratio(&[1.0], 0.0).unwrap(), f64::INFINITY);
        assert_eq!(model.sharpe_ratio(&[1.0], 0.001).unwrap(), 0.0);
    }
}

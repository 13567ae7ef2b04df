//! Run configuration and return tables for the command-line tools.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::TRADING_DAYS_PER_YEAR;
use crate::evolution::{FrontierConfig, GeneticConfig};
use crate::linalg::{Matrix, MatrixError};
use crate::sampling::{Sampler, SamplerError};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
}

fn read(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn default_periods_per_year() -> f64 {
    TRADING_DAYS_PER_YEAR
}

fn default_assets() -> usize {
    8
}

fn default_factors() -> usize {
    3
}

fn default_periods() -> usize {
    500
}

/// Factor-model returns used when no table is supplied.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SyntheticReturns {
    #[serde(default = "default_assets")]
    pub assets: usize,
    #[serde(default = "default_factors")]
    pub factors: usize,
    #[serde(default = "default_periods")]
    pub periods: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SyntheticReturns {
    fn default() -> Self {
        SyntheticReturns {
            assets: default_assets(),
            factors: default_factors(),
            periods: default_periods(),
            seed: None,
        }
    }
}

impl SyntheticReturns {
    pub fn sample(&self) -> Result<Matrix, InputError> {
        let mut sampler =
            Sampler::factor_model_synthetic(self.assets, self.factors, self.periods, self.seed)?;
        info!(
            seed = sampler.seed(),
            assets = self.assets,
            periods = self.periods,
            "Sampling synthetic returns"
        );
        Ok(sampler.sample_table()?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    #[serde(default)]
    pub optimiser: GeneticConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    #[serde(default)]
    pub synthetic: SyntheticReturns,
    /// Periods per year used to annualize reported figures.
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Annual target; overrides `optimiser.constraints.target_return` once
    /// divided by `periods_per_year`.
    #[serde(default)]
    pub target_annual_return: Option<f64>,
    /// Annual risk-free rate; overrides `optimiser.fitness.risk_free_rate`
    /// once divided by `periods_per_year`.
    #[serde(default)]
    pub annual_risk_free_rate: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            optimiser: GeneticConfig::default(),
            frontier: FrontierConfig::default(),
            synthetic: SyntheticReturns::default(),
            periods_per_year: default_periods_per_year(),
            target_annual_return: None,
            annual_risk_free_rate: None,
        }
    }
}

impl RunConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InputError> {
        Ok(serde_json::from_str(&read(path.as_ref())?)?)
    }

    /// Optimiser settings with the annual target and risk-free rate, if any,
    /// turned into per-period ones.
    pub fn optimiser_config(&self) -> GeneticConfig {
        let mut config = self.optimiser.clone();
        if let Some(annual) = self.target_annual_return {
            config.constraints.target_return = Some(annual / self.periods_per_year);
        }
        if let Some(annual) = self.annual_risk_free_rate {
            config.fitness.risk_free_rate = annual / self.periods_per_year;
        }
        config
    }
}

/// Reads a JSON array of rows (periods) of per-asset returns.
pub fn load_returns(path: impl AsRef<Path>) -> Result<Matrix, InputError> {
    let rows: Vec<Vec<f64>> = serde_json::from_str(&read(path.as_ref())?)?;
    Ok(Matrix::from_rows(&rows)?)
}

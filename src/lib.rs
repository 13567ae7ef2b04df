//! Mean/covariance portfolio model and a genetic search for the allocation
//! with the best penalised Sharpe ratio.

pub mod constraints;
pub mod consts;
pub mod evolution;
pub mod input;
pub mod linalg;
pub mod portfolio;
pub mod report;
pub mod sampling;
pub mod weights;

pub use evolution::{
    efficient_frontier, EvolutionError, EvolutionResult, FitnessConfig, GeneticConfig,
    GeneticOptimiser,
};
pub use linalg::Matrix;
pub use portfolio::{PortfolioError, PortfolioModel};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraints::ConstraintConfig;
use crate::consts::ELITISM_DIVISOR;
use crate::portfolio::PortfolioError;
use crate::weights::WeightError;

pub mod fitness;
pub mod frontier;
mod operators;
pub mod optimiser;

pub use fitness::{FitnessConfig, PenalisedSharpe};
pub use frontier::{efficient_frontier, EfficientFrontier, FrontierConfig, FrontierPoint};
pub use optimiser::GeneticOptimiser;

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Invalid population parameters were passed: {0}")]
    BadPopulationParameter(String),
    #[error("Invalid frontier parameters were passed: {0}")]
    BadFrontierParameter(String),
    #[error("Mutation noise could not be built: {0}")]
    MutationNoise(#[from] rand_distr::NormalError),
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Weights(#[from] WeightError),
    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn default_population_size() -> usize {
    100
}

fn default_generations() -> usize {
    1000
}

fn default_mutation_rate() -> f64 {
    0.05
}

fn default_crossover_rate() -> f64 {
    0.7
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

/// Hyperparameters of the genetic search.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneticConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    #[serde(default)]
    pub fitness: FitnessConfig,
    /// Seed for the optimiser's generator; drawn from the OS when absent.
    #[serde(default)]
    pub global_seed: Option<u64>,
    /// Worker threads used to evaluate fitness. `0` or `1` evaluates inline.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        GeneticConfig {
            population_size: default_population_size(),
            generations: default_generations(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            constraints: ConstraintConfig::default(),
            fitness: FitnessConfig::default(),
            global_seed: None,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl GeneticConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Individuals carried unchanged into the next generation.
    pub fn elite_count(&self) -> usize {
        self.population_size / ELITISM_DIVISOR
    }

    pub fn validate(&self) -> Result<(), EvolutionError> {
        let bad = |msg: String| Err(EvolutionError::BadPopulationParameter(msg));

        if self.population_size == 0 {
            return bad("Population size cannot be zero".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return bad(format!(
                "Mutation rate must lie in [0, 1], got {}",
                self.mutation_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return bad(format!(
                "Crossover rate must lie in [0, 1], got {}",
                self.crossover_rate
            ));
        }
        let ConstraintConfig {
            lower_bound,
            upper_bound,
            target_return,
        } = self.constraints;
        if !lower_bound.is_finite() || !upper_bound.is_finite() || lower_bound > upper_bound {
            return bad(format!(
                "Weight bounds must be finite with lower <= upper, got [{}, {}]",
                lower_bound, upper_bound
            ));
        }
        if target_return.is_some_and(|t| t.is_nan()) {
            return bad("Target return cannot be NaN".into());
        }
        Ok(())
    }
}

/// Outcome of one `optimise` run, with per-generation fitness history.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EvolutionResult {
    pub best_weights: Vec<f64>,
    pub best_fitness: f64,
    /// Running best after each generation (never increases).
    pub best_fitness_per_generation: Vec<f64>,
    /// Lowest fitness within each generation.
    pub generation_best_fitness: Vec<f64>,
    /// Mean of the finite fitness values within each generation.
    pub average_fitness_per_generation: Vec<f64>,
}

use itertools::Itertools;
use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::Normal;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::consts::PERTURBATION;
use crate::evolution::fitness::PenalisedSharpe;
use crate::evolution::operators::{
    generate_offsprings, initialize_population, select_elites, OperatorParams,
};
use crate::evolution::{EvolutionError, EvolutionResult, GeneticConfig};
use crate::portfolio::{PortfolioError, PortfolioModel};

/// Genetic search for the allocation that minimises [`PenalisedSharpe`].
///
/// All randomness comes from the generator owned by the optimiser, so two
/// optimisers built with the same seed (or generator state) return the same
/// weights. Fitness evaluation can be spread over a rayon pool; it consumes
/// no randomness.
#[derive(Debug)]
pub struct GeneticOptimiser<'a, R = ChaCha20Rng> {
    model: &'a PortfolioModel,
    config: GeneticConfig,
    objective: PenalisedSharpe,
    noise: Normal<f64>,
    pool: Option<ThreadPool>,
    rng: R,
}

impl<'a> GeneticOptimiser<'a, ChaCha20Rng> {
    /// Seeds a ChaCha generator from `config.global_seed`, or from the OS when unset.
    pub fn new(model: &'a PortfolioModel, config: GeneticConfig) -> Result<Self, EvolutionError> {
        let seed = config.global_seed.unwrap_or_else(|| OsRng.next_u64());
        debug!(seed, "Seeding genetic optimiser");
        Self::with_rng(model, config, ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<'a, R: Rng> GeneticOptimiser<'a, R> {
    /// Builds an optimiser around a caller-supplied generator. `global_seed` is ignored.
    pub fn with_rng(
        model: &'a PortfolioModel,
        config: GeneticConfig,
        rng: R,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;

        let noise = Normal::new(0.0, PERTURBATION)?;
        let pool = if config.max_concurrency > 1 {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(config.max_concurrency)
                    .build()?,
            )
        } else {
            None
        };

        Ok(GeneticOptimiser {
            model,
            objective: PenalisedSharpe::new(config.constraints, config.fitness),
            config,
            noise,
            pool,
            rng,
        })
    }

    /// Overrides the generation bound.
    pub fn with_generations(mut self, generations: usize) -> Self {
        self.config.generations = generations;
        self
    }

    pub fn config(&self) -> &GeneticConfig {
        &self.config
    }

    pub fn model(&self) -> &PortfolioModel {
        self.model
    }

    pub fn fitness(&self, weights: &[f64]) -> Result<f64, EvolutionError> {
        Ok(self.objective.evaluate(self.model, weights)?)
    }

    fn operator_params(&self) -> OperatorParams {
        OperatorParams {
            crossover_rate: self.config.crossover_rate,
            mutation_rate: self.config.mutation_rate,
            lower_bound: self.config.constraints.lower_bound,
            upper_bound: self.config.constraints.upper_bound,
        }
    }

    fn evaluate_population(&self, population: &[Vec<f64>]) -> Result<Vec<f64>, EvolutionError> {
        let objective = &self.objective;
        let model = self.model;

        let fitnesses = match &self.pool {
            Some(pool) => pool.install(|| {
                population
                    .par_iter()
                    .map(|weights| objective.evaluate(model, weights))
                    .collect::<Result<Vec<f64>, PortfolioError>>()
            }),
            None => population
                .iter()
                .map(|weights| objective.evaluate(model, weights))
                .collect::<Result<Vec<f64>, PortfolioError>>(),
        }?;
        Ok(fitnesses)
    }

    /// Runs the search and returns the best weights seen in any generation.
    /// Never fails because an individual's weights summed to zero.
    pub fn optimise(&mut self) -> Result<Vec<f64>, EvolutionError> {
        Ok(self.optimise_with_history()?.best_weights)
    }

    /// Same as [`optimise`](Self::optimise), also reporting fitness per generation.
    ///
    /// A child whose weights sum to zero is replaced by the uniform allocation,
    /// so degenerate normalization never aborts a run.
    pub fn optimise_with_history(&mut self) -> Result<EvolutionResult, EvolutionError> {
        let population_size = self.config.population_size;
        let generations = self.config.generations;
        let elite_population_size = self.config.elite_count();
        let params = self.operator_params();

        if elite_population_size == 0 {
            warn!(
                population_size,
                "Elite population size rounded to 0, no individual survives unchanged"
            );
        }

        let mut population = initialize_population(
            population_size,
            self.model.num_assets(),
            &params,
            &mut self.rng,
        )?;

        let mut best: Option<(Vec<f64>, f64)> = None;
        let mut best_fitness_per_generation = Vec::with_capacity(generations);
        let mut generation_best_fitness = Vec::with_capacity(generations);
        let mut average_fitness_per_generation = Vec::with_capacity(generations);
        let log_interval = (generations / 10).max(1);

        for generation in 0..generations {
            let fitnesses = self.evaluate_population(&population)?;
            let best_index = fittest(&fitnesses)?;
            let current_best = fitnesses[best_index];

            if best.as_ref().map_or(true, |(_, f)| current_best < *f) {
                best = Some((population[best_index].clone(), current_best));
            }
            let running_best = best.as_ref().map_or(f64::MAX, |(_, f)| *f);

            best_fitness_per_generation.push(running_best);
            generation_best_fitness.push(current_best);
            average_fitness_per_generation.push(finite_mean(&fitnesses));

            // Elites carry over untouched, the rest is bred from the whole population.
            let mut next_generation =
                select_elites(&population, &fitnesses, elite_population_size);
            generate_offsprings(
                &population,
                &fitnesses,
                &mut next_generation,
                population_size,
                &params,
                &self.noise,
                &mut self.rng,
            );
            population = next_generation;

            if (generation + 1) % log_interval == 0
                || generation == 0
                || generation + 1 == generations
            {
                info!(
                    generation = generation + 1,
                    generations,
                    best_fitness = running_best,
                    generation_best_fitness = current_best,
                    "Generation complete"
                );
            }
        }

        let (best_weights, mut best_fitness) = match best {
            Some(best) => best,
            // no generation ran: fall back to the initial population
            None => {
                let fitnesses = self.evaluate_population(&population)?;
                let index = fittest(&fitnesses)?;
                (population.swap_remove(index), fitnesses[index])
            }
        };

        let final_fitness = self.fitness(&best_weights)?;
        if final_fitness < best_fitness {
            best_fitness = final_fitness;
        }
        info!(best_fitness, "Optimization complete");

        Ok(EvolutionResult {
            best_weights,
            best_fitness,
            best_fitness_per_generation,
            generation_best_fitness,
            average_fitness_per_generation,
        })
    }
}

/// Index of the lowest fitness (first one on ties).
fn fittest(fitnesses: &[f64]) -> Result<usize, EvolutionError> {
    fitnesses
        .iter()
        .position_min_by(|a, b| a.total_cmp(b))
        .ok_or_else(|| EvolutionError::BadPopulationParameter("Population is empty".into()))
}

fn finite_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

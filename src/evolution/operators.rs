//! Selection, crossover and mutation over owned weight vectors.
//!
//! Every operator draws from the caller's generator so a seeded optimiser
//! replays the same trajectory.

use itertools::Itertools;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

use crate::consts::TOURNAMENT_SIZE;
use crate::evolution::EvolutionError;
use crate::weights::{clip_weights, normalize, random_weights, uniform_weights};

/// Operator parameters copied out of the optimiser configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperatorParams {
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Normalizes in place, replacing a vector whose sum vanished with the
/// uniform allocation.
pub(crate) fn renormalize_or_uniform(weights: &mut Vec<f64>) {
    if let Err(err) = normalize(weights) {
        warn!(%err, "Replacing degenerate individual with uniform weights");
        *weights = uniform_weights(weights.len());
    }
}

pub(crate) fn initialize_population<R: Rng + ?Sized>(
    population_size: usize,
    assets_under_management: usize,
    params: &OperatorParams,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>, EvolutionError> {
    if population_size == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Population size cannot be zero".into(),
        ));
    }

    (0..population_size)
        .map(|_| -> Result<Vec<f64>, EvolutionError> {
            let mut portfolio = random_weights(assets_under_management, rng)?;
            clip_weights(&mut portfolio, params.lower_bound, params.upper_bound);
            renormalize_or_uniform(&mut portfolio);
            Ok(portfolio)
        })
        .collect()
}

/// Draws `TOURNAMENT_SIZE` contestants with replacement and returns the index
/// of the one with the lowest fitness (the first drawn wins ties).
pub(crate) fn tournament_selection<R: Rng + ?Sized>(fitnesses: &[f64], rng: &mut R) -> usize {
    let mut best = rng.gen_range(0..fitnesses.len());
    for _ in 1..TOURNAMENT_SIZE {
        let contestant = rng.gen_range(0..fitnesses.len());
        if fitnesses[contestant] < fitnesses[best] {
            best = contestant;
        }
    }
    best
}

/// Uniform crossover: each gene is swapped between the children with
/// probability `crossover_rate`. Both children are renormalized.
pub(crate) fn crossover<R: Rng + ?Sized>(
    parent_1: &[f64],
    parent_2: &[f64],
    crossover_rate: f64,
    rng: &mut R,
) -> (Vec<f64>, Vec<f64>) {
    let mut child_1 = parent_1.to_vec();
    let mut child_2 = parent_2.to_vec();

    for (gene_1, gene_2) in child_1.iter_mut().zip(child_2.iter_mut()) {
        if rng.gen::<f64>() < crossover_rate {
            std::mem::swap(gene_1, gene_2);
        }
    }

    renormalize_or_uniform(&mut child_1);
    renormalize_or_uniform(&mut child_2);
    (child_1, child_2)
}

/// Adds Gaussian noise to each gene with probability `mutation_rate`; a
/// touched vector is clipped to bounds and renormalized.
pub(crate) fn mutate<R: Rng + ?Sized>(
    weights: &mut Vec<f64>,
    params: &OperatorParams,
    noise: &Normal<f64>,
    rng: &mut R,
) {
    let mut mutated = false;
    for weight in weights.iter_mut() {
        if rng.gen::<f64>() < params.mutation_rate {
            *weight += noise.sample(rng);
            mutated = true;
        }
    }

    if mutated {
        clip_weights(weights, params.lower_bound, params.upper_bound);
        renormalize_or_uniform(weights);
    }
}

/// Copies of the `count` fittest individuals, best first. Ties keep population order.
pub(crate) fn select_elites(
    population: &[Vec<f64>],
    fitnesses: &[f64],
    count: usize,
) -> Vec<Vec<f64>> {
    (0..population.len())
        .sorted_by(|&a, &b| fitnesses[a].total_cmp(&fitnesses[b]))
        .take(count)
        .map(|i| population[i].clone())
        .collect()
}

/// Breeds children until `next_generation` holds `population_size` individuals.
pub(crate) fn generate_offsprings<R: Rng + ?Sized>(
    population: &[Vec<f64>],
    fitnesses: &[f64],
    next_generation: &mut Vec<Vec<f64>>,
    population_size: usize,
    params: &OperatorParams,
    noise: &Normal<f64>,
    rng: &mut R,
) {
    while next_generation.len() < population_size {
        let parent_1 = &population[tournament_selection(fitnesses, rng)];
        let parent_2 = &population[tournament_selection(fitnesses, rng)];

        let (mut child_1, mut child_2) = crossover(parent_1, parent_2, params.crossover_rate, rng);
        mutate(&mut child_1, params, noise, rng);
        mutate(&mut child_2, params, noise, rng);

        next_generation.push(child_1);
        if next_generation.len() < population_size {
            next_generation.push(child_2);
        }
    }
}

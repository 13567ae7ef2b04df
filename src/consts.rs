/// Tolerance used by every feasibility check (sum-to-one, bounds, target return).
pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-8;

/// Below this a sum (or a risk) is treated as zero.
pub const DEGENERATE_THRESHOLD: f64 = 1e-12;

/// Standard deviation of the Gaussian noise added to a mutated gene.
pub const PERTURBATION: f64 = 0.05;

/// Contestants drawn (with replacement) per tournament.
pub const TOURNAMENT_SIZE: usize = 3;

/// One elite is kept for every `ELITISM_DIVISOR` individuals.
pub const ELITISM_DIVISOR: usize = 20;

/// Flat penalty charged when a target return cannot be evaluated because
/// the weight and mean vectors differ in length.
pub const TARGET_SIZE_MISMATCH_PENALTY: f64 = 1000.0;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

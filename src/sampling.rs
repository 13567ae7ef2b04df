//! Synthetic return tables drawn from multivariate normal models.
//!
//! A sampler owns its seeded generator, so repeated calls to
//! [`Sampler::sample_returns`] continue the same stream and
//! [`Sampler::reseed`] restarts it.

use rand::distributions::Uniform;
use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use statrs::distribution::MultivariateNormal;
use thiserror::Error;
use tracing::debug;

use crate::linalg::{Matrix, MatrixError};

const FACTOR_MEAN_RETURN: f64 = 0.001;
const IDIOSYNCRATIC_VARIANCE: f64 = 0.01;
const COVARIANCE_JITTER: f64 = 1e-8;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Assets and factors should be positive, got {assets} assets and {factors} factors")]
    EmptyModel { assets: usize, factors: usize },
    #[error("Covariance has {found} entries, expected {expected}")]
    CovarianceSize { expected: usize, found: usize },
    #[error("Failed to create multivariate normal: {0}")]
    Distribution(String),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

#[derive(Debug, Clone)]
pub enum Sampler {
    /// Asset returns driven by a handful of uncorrelated factors plus
    /// independent noise.
    FactorModel {
        assets_under_management: usize,
        number_of_factors: usize,
        periods_to_sample: usize,

        factor_covariance: Matrix,
        loadings: Matrix,
        mu_assets: Vec<f64>,
        covariance_assets: Matrix,

        normal_distribution: MultivariateNormal,
        rng: ChaCha20Rng,
        seed: u64,
    },

    Normal {
        periods_to_sample: usize,
        means: Vec<f64>,
        covariance: Matrix,

        normal_distribution: MultivariateNormal,
        rng: ChaCha20Rng,
        seed: u64,
    },
}

fn multivariate_normal(
    means: &[f64],
    covariance: &Matrix,
) -> Result<MultivariateNormal, SamplerError> {
    let flat = covariance.to_rows().into_iter().flatten().collect();
    MultivariateNormal::new(means.to_vec(), flat)
        .map_err(|e| SamplerError::Distribution(e.to_string()))
}

impl Sampler {
    /// `covariance` is row-major, `means.len()` squared entries.
    /// Without a seed one is drawn from the OS and recorded.
    pub fn normal(
        means: &[f64],
        covariance: &[f64],
        periods_to_sample: usize,
        seed: Option<u64>,
    ) -> Result<Self, SamplerError> {
        let assets = means.len();
        if assets == 0 {
            return Err(SamplerError::EmptyModel { assets, factors: 0 });
        }
        if covariance.len() != assets * assets {
            return Err(SamplerError::CovarianceSize {
                expected: assets * assets,
                found: covariance.len(),
            });
        }

        let rows: Vec<Vec<f64>> = covariance.chunks(assets).map(<[f64]>::to_vec).collect();
        let covariance = Matrix::from_rows(&rows)?;
        let normal_distribution = multivariate_normal(means, &covariance)?;

        let seed = seed.unwrap_or_else(|| OsRng.next_u64());
        Ok(Sampler::Normal {
            periods_to_sample,
            means: means.to_vec(),
            covariance,
            normal_distribution,
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
        })
    }

    /// Random factor model: diagonal factor covariance with variances in
    /// `[0.01, 0.2)`, loadings in `[0.5, 1.5)`, asset means given by one
    /// draw of factor returns.
    pub fn factor_model_synthetic(
        assets_under_management: usize,
        number_of_factors: usize,
        periods_to_sample: usize,
        seed: Option<u64>,
    ) -> Result<Self, SamplerError> {
        if assets_under_management == 0 || number_of_factors == 0 {
            return Err(SamplerError::EmptyModel {
                assets: assets_under_management,
                factors: number_of_factors,
            });
        }

        let seed = seed.unwrap_or_else(|| OsRng.next_u64());
        let mut rng = ChaCha20Rng::seed_from_u64(seed);

        let variance_range = Uniform::new(0.01, 0.2);
        let mut factor_covariance = Matrix::zeros(number_of_factors, number_of_factors);
        for i in 0..number_of_factors {
            factor_covariance[(i, i)] = rng.sample(variance_range);
        }

        let factor_distribution =
            multivariate_normal(&vec![FACTOR_MEAN_RETURN; number_of_factors], &factor_covariance)?;
        let factor_returns = rng.sample(&factor_distribution);

        let loading_range = Uniform::new(0.5, 1.5);
        let mut loadings = Matrix::zeros(assets_under_management, number_of_factors);
        for i in 0..assets_under_management {
            for j in 0..number_of_factors {
                loadings[(i, j)] = rng.sample(loading_range);
            }
        }

        let mu_assets = (0..assets_under_management)
            .map(|i| {
                (0..number_of_factors)
                    .map(|j| loadings[(i, j)] * factor_returns[j])
                    .sum()
            })
            .collect::<Vec<f64>>();

        // B * Sf * B^T + D, made exactly symmetric and nudged positive-definite
        let systematic = loadings.dot(&factor_covariance)?.dot(&loadings.transpose())?;
        let idiosyncratic = Matrix::identity(assets_under_management).scale(IDIOSYNCRATIC_VARIANCE);
        let raw = systematic.add(&idiosyncratic)?;
        let covariance_assets = raw
            .add(&raw.transpose())?
            .scale(0.5)
            .add(&Matrix::identity(assets_under_management).scale(COVARIANCE_JITTER))?;

        let normal_distribution = multivariate_normal(&mu_assets, &covariance_assets)?;
        debug!(
            seed,
            assets = assets_under_management,
            factors = number_of_factors,
            "Built synthetic factor model"
        );

        Ok(Sampler::FactorModel {
            assets_under_management,
            number_of_factors,
            periods_to_sample,
            factor_covariance,
            loadings,
            mu_assets,
            covariance_assets,
            normal_distribution,
            rng,
            seed,
        })
    }

    pub fn seed(&self) -> u64 {
        match self {
            Sampler::FactorModel { seed, .. } | Sampler::Normal { seed, .. } => *seed,
        }
    }

    pub fn num_assets(&self) -> usize {
        match self {
            Sampler::FactorModel {
                assets_under_management,
                ..
            } => *assets_under_management,
            Sampler::Normal { means, .. } => means.len(),
        }
    }

    /// Means and covariance of the distribution the rows are drawn from.
    pub fn moments(&self) -> (&[f64], &Matrix) {
        match self {
            Sampler::FactorModel {
                mu_assets,
                covariance_assets,
                ..
            } => (mu_assets.as_slice(), covariance_assets),
            Sampler::Normal {
                means, covariance, ..
            } => (means.as_slice(), covariance),
        }
    }

    /// Draws `periods_to_sample` rows; advances the internal generator.
    pub fn sample_returns(&mut self) -> Vec<Vec<f64>> {
        match self {
            Sampler::FactorModel {
                normal_distribution,
                periods_to_sample,
                rng,
                ..
            }
            | Sampler::Normal {
                normal_distribution,
                periods_to_sample,
                rng,
                ..
            } => (0..*periods_to_sample)
                .map(|_| rng.sample(&*normal_distribution).as_slice().to_vec())
                .collect(),
        }
    }

    /// Same draw as [`sample_returns`](Self::sample_returns), as a matrix.
    pub fn sample_table(&mut self) -> Result<Matrix, SamplerError> {
        Ok(Matrix::from_rows(&self.sample_returns())?)
    }

    pub fn reseed(&mut self, new_seed: u64) {
        match self {
            Sampler::FactorModel { rng, seed, .. } | Sampler::Normal { rng, seed, .. } => {
                *rng = ChaCha20Rng::seed_from_u64(new_seed);
                *seed = new_seed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normal_sampler_shapes_and_moments() {
        let means = [0.01, -0.02];
        let covariance = [0.0004, 0.0001, 0.0001, 0.0009];
        let mut sampler = Sampler::normal(&means, &covariance, 20_000, Some(3)).unwrap();
        assert_eq!(sampler.seed(), 3);
        assert_eq!(sampler.num_assets(), 2);

        let table = sampler.sample_table().unwrap();
        assert_eq!(table.shape(), (20_000, 2));

        let sample_means = table.mean_per_column();
        assert!((sample_means[0] - 0.01).abs() < 1e-3);
        assert!((sample_means[1] + 0.02).abs() < 1e-3);
        let sample_covariance = table.covariance_matrix().unwrap();
        assert_relative_eq!(sample_covariance[(0, 0)], 0.0004, max_relative = 0.05);
        assert_relative_eq!(sample_covariance[(1, 1)], 0.0009, max_relative = 0.05);
        assert_relative_eq!(sample_covariance[(0, 1)], 0.0001, max_relative = 0.25);
    }

    #[test]
    fn normal_sampler_rejects_bad_input() {
        assert!(matches!(
            Sampler::normal(&[0.0, 0.0], &[1.0, 0.0, 0.0], 5, Some(1)),
            Err(SamplerError::CovarianceSize {
                expected: 4,
                found: 3
            })
        ));
        assert!(matches!(
            Sampler::normal(&[], &[], 5, Some(1)),
            Err(SamplerError::EmptyModel { .. })
        ));
        assert!(matches!(
            Sampler::normal(&[0.0, 0.0], &[1.0, 2.0, 2.0, 1.0], 5, Some(1)),
            Err(SamplerError::Distribution(_))
        ));
    }

    #[test]
    fn reseeding_replays_the_stream() {
        let mut sampler = Sampler::factor_model_synthetic(4, 2, 10, Some(11)).unwrap();
        sampler.reseed(5);
        assert_eq!(sampler.seed(), 5);
        let first = sampler.sample_returns();
        let second = sampler.sample_returns();
        assert_ne!(first, second);

        sampler.reseed(5);
        assert_eq!(sampler.sample_returns(), first);
    }

    #[test]
    fn factor_model_is_reproducible_from_its_seed() {
        let mut a = Sampler::factor_model_synthetic(5, 3, 8, Some(42)).unwrap();
        let mut b = Sampler::factor_model_synthetic(5, 3, 8, Some(42)).unwrap();
        assert_eq!(a.moments(), b.moments());
        assert_eq!(a.sample_returns(), b.sample_returns());

        let unseeded = Sampler::factor_model_synthetic(5, 3, 8, None).unwrap();
        assert_eq!(unseeded.num_assets(), 5);
    }

    #[test]
    fn factor_covariance_is_symmetric_and_positive_definite() {
        let sampler = Sampler::factor_model_synthetic(6, 2, 1, Some(7)).unwrap();
        let (means, covariance) = sampler.moments();
        assert_eq!(means.len(), 6);
        assert_eq!(covariance.shape(), (6, 6));
        for i in 0..6 {
            assert!(covariance[(i, i)] > IDIOSYNCRATIC_VARIANCE);
            for j in 0..6 {
                assert_eq!(covariance[(i, j)], covariance[(j, i)]);
            }
        }
        assert!(covariance.cholesky_decompose().is_ok());
    }

    #[test]
    fn factor_model_rejects_empty_dimensions() {
        assert!(Sampler::factor_model_synthetic(0, 2, 5, Some(1)).is_err());
        assert!(Sampler::factor_model_synthetic(3, 0, 5, Some(1)).is_err());
    }
}

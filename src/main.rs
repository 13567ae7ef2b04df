use std::env;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meridian::input::{load_returns, RunConfig};
use meridian::report::{minimum_variance_weights, PortfolioPerformance};
use meridian::{GeneticOptimiser, PortfolioModel};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match env::var("MERIDIAN_CONFIG") {
        Ok(path) => RunConfig::from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        Err(_) => RunConfig::default(),
    };
    let returns = match env::var("MERIDIAN_RETURNS") {
        Ok(path) => {
            load_returns(&path).with_context(|| format!("Failed to load returns from {}", path))?
        }
        Err(_) => config
            .synthetic
            .sample()
            .context("Failed to sample synthetic returns")?,
    };

    let model = PortfolioModel::new(returns).context("Returns table is not usable")?;
    info!(
        assets = model.num_assets(),
        periods = model.num_periods(),
        "Loaded returns"
    );

    let optimiser_config = config.optimiser_config();
    let risk_free = optimiser_config.fitness.risk_free_rate;
    let result = GeneticOptimiser::new(&model, optimiser_config)?.optimise_with_history()?;

    let optimised = PortfolioPerformance::annualized(
        &model,
        &result.best_weights,
        risk_free,
        config.periods_per_year,
    )?;
    let minimum_variance = match minimum_variance_weights(&model) {
        Ok(weights) => Some(PortfolioPerformance::annualized(
            &model,
            &weights,
            risk_free,
            config.periods_per_year,
        )?),
        Err(err) => {
            warn!(%err, "Skipping minimum-variance reference");
            None
        }
    };

    let report = json!({
        "optimised": optimised,
        "best_fitness": result.best_fitness,
        "generations": result.best_fitness_per_generation.len(),
        "minimum_variance": minimum_variance,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

use std::env;

use anyhow::{Context, Result};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meridian::efficient_frontier;
use meridian::input::{load_returns, RunConfig};
use meridian::report::PortfolioPerformance;
use meridian::PortfolioModel;

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

    let base = config.optimiser_config();
    let frontier = efficient_frontier(&model, &base, &config.frontier)?;

    let periods = config.periods_per_year;
    let points: Vec<_> = frontier
        .points
        .iter()
        .map(|point| {
            json!({
                "risk": point.risk * periods.sqrt(),
                "return": point.expected_return * periods,
                "target_return": point.target_return.map(|t| t * periods),
            })
        })
        .collect();
    let best_sharpe = PortfolioPerformance::annualized(
        &model,
        &frontier.best_sharpe.weights,
        base.fitness.risk_free_rate,
        periods,
    )?;

    let report = json!({
        "frontier": points,
        "best_sharpe": best_sharpe,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

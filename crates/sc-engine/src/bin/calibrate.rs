use anyhow::Context;
use sc_engine::{run_experiments, CalibrationRunConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SIMCAL_CONFIG").ok())
        .context("usage: sc-calibrate <run-config.json> (or set SIMCAL_CONFIG)")?;

    let config = CalibrationRunConfig::load(&path)
        .with_context(|| format!("loading run configuration {path}"))?;
    let experiments = run_experiments(&config).await?;

    println!("{}", serde_json::to_string_pretty(&experiments)?);
    Ok(())
}

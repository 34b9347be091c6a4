//! docket-harvest binary
//!
//! Usage: `docket-harvest [config.toml]`. Environment variables prefixed
//! with `DOCKET__` override the file.

use anyhow::{Context, Result};
use std::path::PathBuf;

use docket_harvest::infrastructure::logging::init_logging_with_config;
use docket_harvest::{ConfigManager, run_harvest};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ConfigManager::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_logging_with_config(&config.logging).context("Failed to initialize logging")?;

    let summary = run_harvest(config).await.context("Harvest run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

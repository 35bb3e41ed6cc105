use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use chaosrun_core::config::ChaosrunConfig;
use chaosrun_runner::cli::RunnerCli;
use chaosrun_runner::{logging, runner, signal};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = RunnerCli::parse();

    let mut config = match &cli.config {
        Some(path) => ChaosrunConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?,
        None => {
            let mut config = ChaosrunConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    cli.apply_overrides(&mut config.general);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

    logging::init_tracing(&config.general)?;
    chaosrun_core::metrics::describe_all();

    if cli.validate {
        tracing::info!(experiment = %config.experiment.name, "configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    tracing::info!(experiment = %config.experiment.name, "chaosrun starting");

    let termination = CancellationToken::new();
    signal::forward_termination_signals(termination.clone())?;

    let controller = runner::build_controller(&config, termination.clone()).await?;
    let outcome = runner::drive(&controller).await;
    termination.cancel();

    tracing::info!(?outcome, "chaosrun exiting");
    Ok(ExitCode::from(outcome.exit_code()))
}

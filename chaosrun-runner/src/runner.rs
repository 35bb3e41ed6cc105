//! Experiment assembly and process outcome.
//!
//! [`build_controller`] wires the concrete collaborators from
//! `ChaosrunConfig`; [`drive`] runs the controller until it returns or the
//! abort watcher signals termination, whichever comes first.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use chaosrun_core::config::ChaosrunConfig;
use chaosrun_core::types::Verdict;
use chaosrun_experiment::{
    BollardDockerClient, CommandProbeRunner, ContainerKillInjector, DockerHealthChecker,
    EngineSource, EventSink, FileEngineSource, FileResultStore, HealthChecker, Injector,
    LifecycleConfig, LifecycleController, LifecycleControllerBuilder, ProbeRunner, ResultStore,
    experiment_details,
};

use crate::sink::RunnerEventSink;

/// Controller wired with the production collaborators.
pub type RunnerController = LifecycleController<
    FileEngineSource,
    DockerHealthChecker<BollardDockerClient>,
    CommandProbeRunner,
    ContainerKillInjector<BollardDockerClient>,
    FileResultStore,
    RunnerEventSink,
>;

/// How the run ended, from the process point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The controller returned with this verdict.
    Completed(Verdict),
    /// The abort watcher stopped the run.
    Stopped,
    /// Setup failed before a result record existed.
    SetupFailed,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Completed(_) => 0,
            Self::Stopped | Self::SetupFailed => 1,
        }
    }
}

/// Builds the controller for the configured experiment.
pub async fn build_controller(
    config: &ChaosrunConfig,
    signal: CancellationToken,
) -> Result<RunnerController> {
    let lifecycle = LifecycleConfig::from_core(&config.runner);
    let details = experiment_details(&config.experiment)
        .map_err(|e| anyhow::anyhow!("invalid experiment config: {e}"))?;

    let docker = Arc::new(
        BollardDockerClient::connect_with_socket(&config.runner.docker_socket)
            .map_err(|e| anyhow::anyhow!("failed to create docker client: {e}"))?,
    );
    let sink = RunnerEventSink::from_config(&config.runner)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open event sink: {e}"))?;

    let controller = LifecycleControllerBuilder::new()
        .injector(Arc::new(ContainerKillInjector::new(
            Arc::clone(&docker),
            lifecycle.injector_settings(),
        )))
        .health_checker(Arc::new(DockerHealthChecker::new(docker)))
        .config(lifecycle)
        .details(details)
        .engine_source(Arc::new(FileEngineSource::new(&config.runner.engine_dir)))
        .probe_runner(Arc::new(CommandProbeRunner::new()))
        .result_store(Arc::new(FileResultStore::new(&config.runner.result_dir)))
        .event_sink(Arc::new(sink))
        .termination_signal(signal)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build lifecycle controller: {e}"))?;

    tracing::info!(
        experiment = %controller.details().experiment_name,
        engine = controller.details().engine_name.as_deref().unwrap_or("-"),
        "lifecycle controller initialized"
    );
    Ok(controller)
}

/// Runs the controller and maps the result to a [`RunOutcome`].
///
/// Returns as soon as the abort watcher has committed `Stopped`, without
/// waiting for in-flight collaborator calls.
pub async fn drive<E, H, P, I, S, K>(controller: &LifecycleController<E, H, P, I, S, K>) -> RunOutcome
where
    E: EngineSource,
    H: HealthChecker,
    P: ProbeRunner,
    I: Injector,
    S: ResultStore,
    K: EventSink,
{
    let aborted = controller.aborted_token();
    tokio::select! {
        biased;
        () = aborted.cancelled() => {
            tracing::warn!("experiment stopped by abort watcher");
            RunOutcome::Stopped
        }
        result = controller.run() => match result {
            Ok(Verdict::Stopped) => RunOutcome::Stopped,
            Ok(verdict) => RunOutcome::Completed(verdict),
            Err(e) => {
                tracing::error!(error = %e, "experiment setup failed");
                RunOutcome::SetupFailed
            }
        },
    }
}

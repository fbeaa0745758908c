//! Orchestration command execution.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use maestro_docker::DockerConnector;
use maestro_engine::{Command, Orchestrator, OrchestratorOptions};

use crate::commands::{Cli, TargetArgs};
use crate::report;

/// Loads the environment, runs one orchestration command, prints the
/// report, and returns the process exit code.
pub async fn execute(
    cli: &Cli,
    command: Command,
    args: &TargetArgs,
    refresh_images: bool,
) -> Result<i32> {
    let env = maestro_model::load(&cli.file)?;
    debug!(environment = %env.name, file = %cli.file.display(), "environment loaded");
    let renv = maestro_engine::resolve(env)?;

    let options = OrchestratorOptions {
        ignore_dependencies: args.ignore_dependencies,
        refresh_images,
        ship_concurrency: args.concurrency,
        stop_on_failure: args.stop_on_failure,
    };
    let orchestrator = Orchestrator::new(renv, Arc::new(DockerConnector), options);

    // A first Ctrl-C stops scheduling; in-flight operations settle.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted, waiting for in-flight operations to settle...");
                cancel.cancel();
            }
        });
    }

    let report = orchestrator.run(command, &args.things, &cancel).await?;
    report::print(command, &report);
    Ok(i32::from(!report.success()))
}

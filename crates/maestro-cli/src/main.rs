//! Maestro CLI - dependency-ordered multi-host container orchestration.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod report;

use commands::{Cli, Commands};
use maestro_engine::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep normal runs quiet (the report is the output); -v turns on the
    // orchestration logs.
    let filter = if cli.verbose {
        "maestro_cli=debug,maestro_engine=debug,maestro_docker=debug,\
         maestro_probes=debug,maestro_model=debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let exit_code = match &cli.command {
        Commands::Status(args) => {
            commands::orchestrate::execute(&cli, Command::Status, args, false).await?
        }
        Commands::Start(args) => {
            commands::orchestrate::execute(&cli, Command::Start, &args.target, args.refresh_images)
                .await?
        }
        Commands::Stop(args) => {
            commands::orchestrate::execute(&cli, Command::Stop, args, false).await?
        }
        Commands::Restart(args) => {
            commands::orchestrate::execute(
                &cli,
                Command::Restart,
                &args.target,
                args.refresh_images,
            )
            .await?
        }
        Commands::Clean(args) => {
            commands::orchestrate::execute(&cli, Command::Clean, args, false).await?
        }
        Commands::Pull(args) => {
            commands::orchestrate::execute(&cli, Command::Pull, args, true).await?
        }
        Commands::Logs(args) => commands::logs::execute(&cli, args).await?,
        Commands::Deptree(args) => commands::deptree::execute(&cli, args)?,
    };

    std::process::exit(exit_code)
}

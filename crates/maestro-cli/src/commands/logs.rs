//! Logs command implementation.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::io::Write;

use maestro_docker::{demux_log_stream, ContainerDaemon, DockerClient};

use crate::commands::Cli;

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Instance to show logs from
    pub thing: String,

    /// Only show the last LINES lines
    #[arg(short = 'n', long = "lines")]
    pub lines: Option<usize>,
}

/// Executes the logs command.
pub async fn execute(cli: &Cli, args: &LogsArgs) -> Result<i32> {
    let env = maestro_model::load(&cli.file)?;

    // Logs target exactly one instance; substring selection must be
    // unambiguous.
    let matches: Vec<&str> = env
        .instances()
        .filter(|(_, instance)| instance.name.contains(&args.thing))
        .map(|(_, instance)| instance.name.as_str())
        .collect();
    let name = match matches.as_slice() {
        [] => bail!("{:?} does not match any instance", args.thing),
        [name] => (*name).to_string(),
        names => bail!("{:?} is ambiguous: matches {}", args.thing, names.join(", ")),
    };

    let (_, instance) = env.instance(&name).context("instance disappeared")?;
    let ship = env.ship_of(instance);
    let client = DockerClient::for_ship(ship).await?;
    let raw = client.container_logs(&name, args.lines).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&demux_log_stream(&raw))?;
    stdout.flush()?;
    Ok(0)
}

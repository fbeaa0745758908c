//! CLI command definitions.
//!
//! Subcommands map one-to-one onto orchestration commands, plus `logs`
//! (single-container log retrieval) and `deptree` (dependency display).
//! Positional arguments select services or instances by substring match;
//! an empty selection means every non-omitted service.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod deptree;
pub mod logs;
pub mod orchestrate;

/// Maestro - dependency-ordered multi-host container orchestration
#[derive(Parser)]
#[command(name = "maestro")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Environment description file
    #[arg(short = 'f', long = "file", global = true, default_value = "maestro.yaml")]
    pub file: PathBuf,

    /// Enable debug output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Target selection and scheduling flags shared by all orchestration
/// commands.
#[derive(Args)]
pub struct TargetArgs {
    /// Services or instances to act on (substring match, empty = all
    /// non-omitted services)
    pub things: Vec<String>,

    /// Ignore dependency order and act on the targets only, sequentially
    #[arg(short = 'o', long)]
    pub ignore_dependencies: bool,

    /// Concurrent container operations allowed per ship
    #[arg(short = 'c', long = "concurrency", default_value_t = 1)]
    pub concurrency: usize,

    /// Abort the walk after the first failing level
    #[arg(long)]
    pub stop_on_failure: bool,
}

/// Flags for commands that may refresh images.
#[derive(Args)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Force an image pull before creating containers
    #[arg(short = 'r', long)]
    pub refresh_images: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Display container status
    Status(TargetArgs),

    /// Start services and containers
    Start(StartArgs),

    /// Stop services and containers
    Stop(TargetArgs),

    /// Restart services and containers
    Restart(StartArgs),

    /// Remove stopped containers
    Clean(TargetArgs),

    /// Pull container images from their registries
    Pull(TargetArgs),

    /// Show logs from a container
    Logs(logs::LogsArgs),

    /// Display the service dependency tree
    Deptree(deptree::DeptreeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_flags_parse() {
        let cli = Cli::parse_from(["maestro", "-f", "prod.yaml", "start", "-r", "-c", "3", "web"]);
        assert_eq!(cli.file, std::path::PathBuf::from("prod.yaml"));
        match cli.command {
            Commands::Start(args) => {
                assert!(args.refresh_images);
                assert_eq!(args.target.concurrency, 3);
                assert_eq!(args.target.things, vec!["web"]);
                assert!(!args.target.ignore_dependencies);
            }
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["maestro", "status"]);
        assert_eq!(cli.file, std::path::PathBuf::from("maestro.yaml"));
        match cli.command {
            Commands::Status(args) => {
                assert!(args.things.is_empty());
                assert_eq!(args.concurrency, 1);
            }
            _ => panic!("expected status command"),
        }
    }
}

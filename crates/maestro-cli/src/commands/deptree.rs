//! Deptree command implementation.

use anyhow::Result;
use clap::Args;
use std::collections::BTreeSet;

use maestro_model::Environment;

use crate::commands::Cli;

/// Arguments for the deptree command.
#[derive(Args)]
pub struct DeptreeArgs {
    /// Services to display (substring match, empty = all)
    pub things: Vec<String>,

    /// Show dependencies recursively (possible duplicates)
    #[arg(short = 'r', long)]
    pub recursive: bool,
}

/// Executes the deptree command.
pub fn execute(cli: &Cli, args: &DeptreeArgs) -> Result<i32> {
    let env = maestro_model::load(&cli.file)?;
    // Resolving validates the graph so a cyclic file fails here too.
    let renv = maestro_engine::resolve(env)?;
    let env = renv.environment();

    let mut names: Vec<&str> = env
        .services
        .keys()
        .map(String::as_str)
        .filter(|name| {
            args.things.is_empty() || args.things.iter().any(|t| name.contains(t.as_str()))
        })
        .collect();
    names.sort_unstable();

    for (index, name) in names.iter().enumerate() {
        println!("{name}");
        print_subtree(env, name, " ", &mut BTreeSet::new(), args.recursive);
        if index + 1 < names.len() {
            println!();
        }
    }
    Ok(0)
}

fn print_subtree(
    env: &Environment,
    service: &str,
    indent: &str,
    shown: &mut BTreeSet<String>,
    recursive: bool,
) {
    let Some(service) = env.service(service) else { return };
    let mut deps: Vec<&str> = service
        .requires
        .iter()
        .map(String::as_str)
        .filter(|dep| recursive || !shown.contains(*dep))
        .collect();
    deps.sort_unstable();
    shown.extend(deps.iter().map(ToString::to_string));

    for (index, dep) in deps.iter().enumerate() {
        let last = index + 1 == deps.len();
        println!("{indent}{} {dep}", if last { r"\-" } else { "+-" });
        let next_indent = format!("{indent}{}", if last { "  " } else { "|  " });
        print_subtree(env, dep, &next_indent, shown, recursive);
    }
}

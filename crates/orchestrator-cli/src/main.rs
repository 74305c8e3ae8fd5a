//! `orchestrate`: launches the application stack and supervises it until it stops.

use anyhow::Result;
use clap::{Parser, Subcommand};
use process_orchestrator::{ExitPolicy, OrchestratorOptions};
use std::time::Duration;
use tracing::Level;

mod commands;
mod stack;

use stack::StackArgs;

#[derive(Parser)]
#[command(name = "orchestrate")]
#[command(about = "Start the application services as one supervised group")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    stack: StackArgs,

    /// Seconds services get to exit after being interrupted
    #[arg(long, env = "ORCH_GRACE_SECS", default_value_t = 10, global = true)]
    grace_secs: u64,

    /// What to do when one service exits: all-or-nothing or wait-all
    #[arg(long, env = "ORCH_POLICY", default_value = "all-or-nothing", global = true)]
    policy: ExitPolicy,

    /// Print summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every service and supervise the group (default)
    Run,

    /// Show the validated launch order without starting anything
    Plan,

    /// Validate the service table and exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = OrchestratorOptions {
        grace: Duration::from_secs(cli.grace_secs),
        policy: cli.policy,
    };
    let specs = cli.stack.specs();
    let json = cli.json;

    let code = smol::block_on(async {
        match cli.command.unwrap_or(Commands::Run) {
            Commands::Run => commands::run::run(specs, options, json).await,
            Commands::Plan => commands::plan::run(specs, json),
            Commands::Check => commands::check::run(specs),
        }
    })?;

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

//! # dsc CLI entry point
//!
//! Parses command-line arguments, resolves configuration, and dispatches
//! to the subcommand handlers in the library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dsc_cli::config::load_config;
use dsc_cli::dump::{run_dump, DumpArgs};
use dsc_cli::scenario::{run_scenario, ScenarioArgs};
use dsc_cli::stress::{run_stress, StressArgs};

/// Driver Synchronization Core operator tool
///
/// Exercises the transition and operation trackers of a synthetic
/// driver, psoc and vdev tree.
#[derive(Parser, Debug)]
#[command(name = "dsc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the literal admission and cascade scenarios.
    Scenario(ScenarioArgs),

    /// Build a tree and print its snapshot as JSON.
    Dump(DumpArgs),

    /// Randomized multi-threaded exclusion check.
    Stress(StressArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!("dsc CLI starting");

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Scenario(args) => run_scenario(&args, &config),
        Commands::Dump(args) => run_dump(&args, &config),
        Commands::Stress(args) => run_stress(&args, &config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

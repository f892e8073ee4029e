//! Ballotbox CLI - staged election and contest simulations.
//!
//! Commands:
//! - `ballotbox elect <VOTERS>`: Run an election pipeline with VOTERS voters
//! - `ballotbox contest --entry NAME=AREA ...`: Run an egg-hunt contest
//!
//! Progress is logged to stdout; fatal errors go to stderr prefixed with
//! their category.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Error

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ballotbox::PipelineError;
use ballotbox_cli::{contest, elect, Cli, Commands};

/// Exit code for any fatal error
const ERROR_EXIT_CODE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("ballotbox=debug,ballotbox_cli=debug")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout)
        .init();

    let exit_code = dispatch_command(cli).await;
    std::process::exit(exit_code);
}

/// Dispatch a parsed CLI to the appropriate command handler.
async fn dispatch_command(cli: Cli) -> i32 {
    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Elect(args) => match elect::run_elect(args, config).await {
            Ok(outcome) => {
                elect::print_outcome(&outcome);
                0
            }
            Err(e) => report_error(&e),
        },
        Commands::Contest(args) => match contest::run_contest(args, config).await {
            Ok(outcome) => {
                contest::print_outcome(&outcome);
                0
            }
            Err(e) => report_error(&e),
        },
    }
}

/// Print a fatal error with its category prefix and pick the exit code.
fn report_error(error: &PipelineError) -> i32 {
    tracing::debug!(error = ?error, "command failed");
    eprintln!("{} {}", error.category().prefix(), error);
    ERROR_EXIT_CODE
}

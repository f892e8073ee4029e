//! CLI definition for the ballotbox command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ballotbox - staged election and contest simulations
#[derive(Parser, Debug)]
#[command(name = "ballotbox")]
#[command(version)]
#[command(about = "Simulate a staged election pipeline or an egg-hunt contest")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file layered under environment variables and flags
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an election with the given number of voters
    Elect(ElectArgs),
    /// Run an egg-hunt contest
    Contest(ContestArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ElectArgs {
    /// Number of voters (1 to 90000)
    #[arg(allow_negative_numbers = true)]
    pub voters: i64,

    /// Number of parties on the ballot
    #[arg(long)]
    pub parties: Option<u8>,

    /// Seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Chance that a voter passes validation
    #[arg(long, allow_negative_numbers = true)]
    pub validity_probability: Option<f64>,

    /// Chance that a stage takes a break at each checkpoint
    #[arg(long, allow_negative_numbers = true)]
    pub break_probability: Option<f64>,

    /// Where to write the tally report
    #[arg(long, value_name = "PATH", conflicts_with = "no_report")]
    pub report: Option<PathBuf>,

    /// Do not write a tally report
    #[arg(long)]
    pub no_report: bool,

    /// Skip all simulated delays
    #[arg(long)]
    pub instant: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ContestArgs {
    /// Contestant as NAME=AREA; repeat for every contestant
    #[arg(long = "entry", value_name = "NAME=AREA", value_parser = parse_entry)]
    pub entries: Vec<ContestEntry>,

    /// Seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip all simulated delays
    #[arg(long)]
    pub instant: bool,
}

/// A contestant as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContestEntry {
    pub name: String,
    pub area: String,
}

fn parse_entry(raw: &str) -> Result<ContestEntry, String> {
    let (name, area) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=AREA, got '{}'", raw))?;
    Ok(ContestEntry {
        name: name.trim().to_string(),
        area: area.trim().to_string(),
    })
}

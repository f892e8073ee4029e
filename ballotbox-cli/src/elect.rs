//! `ballotbox elect` - run one election and print the results.

use std::path::Path;

use ballotbox::{
    ConfigOverrides, Coordinator, ElectionOutcome, ElectionOverrides, Result, SimulationConfig,
    TimingConfig,
};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::cli::ElectArgs;

/// Command line values as configuration overrides
pub fn overrides(args: &ElectArgs) -> ConfigOverrides {
    ConfigOverrides {
        seed: args.seed,
        break_probability: args.break_probability,
        timing: args.instant.then(TimingConfig::instant),
        election: ElectionOverrides {
            voters: Some(args.voters),
            parties: args.parties,
            validity_probability: args.validity_probability,
            report: args.report.clone(),
            write_report: args.no_report.then_some(false),
        },
    }
}

/// Load the layered configuration and run the election
pub async fn run_elect(args: &ElectArgs, config_file: Option<&Path>) -> Result<ElectionOutcome> {
    let config = SimulationConfig::load(config_file, &overrides(args))?;
    Coordinator::new(config)?.run().await
}

/// Per-party totals with the winner marked
pub fn results_table(outcome: &ElectionOutcome) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Party", "Votes", ""]);
    let winner = outcome.winner.filter(|_| outcome.totals.total() > 0);
    for (party, votes) in outcome.totals.iter() {
        let mark = match winner {
            Some(w) if w.party == party => "winner",
            _ => "",
        };
        table.add_row(vec![party.to_string(), votes.to_string(), mark.to_string()]);
    }
    table
}

/// Print the statistics, totals and report location
pub fn print_outcome(outcome: &ElectionOutcome) {
    println!(
        "Voters: {}  valid: {}  invalid: {}",
        outcome.batch.len(),
        outcome.stats.valid,
        outcome.stats.invalid
    );
    println!("{}", results_table(outcome));
    match outcome.winner.filter(|_| outcome.totals.total() > 0) {
        Some(w) => println!("The winner is party {} with {} votes.", w.party, w.votes),
        None => println!("No valid votes were cast."),
    }
    if let Some(path) = &outcome.report_path {
        println!("Report written to {}", path.display());
    }
}

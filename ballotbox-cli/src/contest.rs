//! `ballotbox contest` - run an egg-hunt contest and print the results.

use std::path::Path;

use ballotbox::{
    ConfigOverrides, ContestOutcome, Contestant, Judge, Result, SimulationConfig, TimingConfig,
};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::cli::ContestArgs;

pub async fn run_contest(args: &ContestArgs, config_file: Option<&Path>) -> Result<ContestOutcome> {
    let overrides = ConfigOverrides {
        seed: args.seed,
        timing: args.instant.then(TimingConfig::instant),
        ..Default::default()
    };
    let config = SimulationConfig::load(config_file, &overrides)?;
    let judge = Judge::new(config)?;
    let contestants = args
        .entries
        .iter()
        .map(|entry| Contestant::new(entry.name.clone(), entry.area.clone()))
        .collect::<Result<Vec<_>>>()?;
    judge.run(contestants).await
}

pub fn results_table(outcome: &ContestOutcome) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Inspector", "Contestant", "Eggs"]);
    for report in &outcome.reports {
        for result in &report.results {
            table.add_row(vec![
                report.inspector.to_string(),
                result.name.clone(),
                result.eggs.to_string(),
            ]);
        }
    }
    table
}

pub fn print_outcome(outcome: &ContestOutcome) {
    println!("{}", results_table(outcome));
    for skipped in &outcome.skipped {
        println!(
            "{} was skipped: nobody supervises {}",
            skipped.name(),
            skipped.area()
        );
    }
    if let Some(winner) = &outcome.winner {
        println!("The winner is {} with {} eggs.", winner.name, winner.eggs);
    }
}

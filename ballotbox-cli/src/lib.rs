//! Command line front end for the ballotbox simulations.
//!
//! The binary is a thin wrapper: [`cli`] defines the arguments, and each
//! subcommand module loads the layered configuration, runs its simulation and
//! prints a results table.

pub mod cli;
pub mod contest;
pub mod elect;

pub use cli::{Cli, Commands, ContestArgs, ContestEntry, ElectArgs};

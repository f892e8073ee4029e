//! Staged election simulation
//!
//! A [`Coordinator`] generates a batch of voters and pushes it through two
//! concurrently running stages:
//!
//! ```text
//! Coordinator --[tally id, batch]--> Validator --[annotated batch]--> Tally
//!      ^                                                               |
//!      +------------------[stats, one VoteEvent per valid voter]-------+
//! ```
//!
//! Every stage signals a one-shot [`ReadinessBarrier`] and waits until all are
//! ready before any data moves. The validator tells the tally its batch is
//! waiting through a directed notification from the [`SignalRouter`]. All
//! participants occasionally contend for a capacity-1 [`SharedGate`] that has
//! nothing to do with the data path.
//!
//! The crate also runs a small egg-hunt contest ([`Judge`]) built from the
//! same channels and notifications.
//!
//! # Example
//!
//! ```no_run
//! use ballotbox::{Coordinator, SimulationConfig};
//!
//! # async fn example() -> ballotbox::Result<()> {
//! let outcome = Coordinator::new(SimulationConfig::for_voters(10))?.run().await?;
//! println!("{} valid, {} invalid", outcome.stats.valid, outcome.stats.invalid);
//! # Ok(())
//! # }
//! ```

pub mod barrier;
pub mod channel;
pub mod config;
pub mod contest;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod random;
pub mod report;
pub mod results;
pub mod signal;
pub mod tally;
pub mod types;
pub mod validator;
pub mod wire;

pub use barrier::{GoAhead, ReadinessBarrier, ReadySignal};
pub use config::{
    ConfigOverrides, ContestConfig, DelayRange, ElectionConfig, ElectionOverrides,
    SimulationConfig, TimingConfig, ValidatedConfig,
};
pub use contest::{ContestOutcome, ContestResult, Contestant, InspectorReport, Judge};
pub use coordinator::{Coordinator, CoordinatorPhase, ElectionOutcome};
pub use error::{ErrorCategory, PipelineError, Result};
pub use gate::{BreakPolicy, GatePass, SharedGate};
pub use random::RandomSource;
pub use report::{read_report, FileReportSink, NoReport, ReportSink};
pub use results::{PartyTotals, Winner};
pub use signal::{SignalInbox, SignalRouter};
pub use types::{PartyId, StageId, TallyStats, VoteEvent, VoterBatch, VoterId, VoterRecord};

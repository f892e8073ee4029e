//! Election coordinator
//!
//! Owns the gate, the readiness barrier, the notification router and every
//! channel. It spawns the validator and the tally, generates the voter batch,
//! and collects statistics and votes until it can name a winner.
//!
//! While driving its own phases the coordinator also watches both stage tasks.
//! A stage that fails ends the run with its own error, which is the root cause
//! of whatever the coordinator would have seen on its channels next.

use crate::barrier::ReadinessBarrier;
use crate::channel::{channel, ChannelReader, ChannelWriter};
use crate::config::{DelayRange, SimulationConfig, MIN_VOTER_ID, MAX_VOTERS};
use crate::gate::{BreakPolicy, SharedGate};
use crate::random::pause;
use crate::report::{default_report_path, FileReportSink, NoReport, ReportSink};
use crate::results::{PartyTotals, Winner};
use crate::signal::SignalRouter;
use crate::tally::{TallySettings, TallyStage, TallySummary};
use crate::types::{StageId, TallyStats, VoteEvent, VoterBatch, VoterId, VoterRecord};
use crate::validator::{ValidatorSettings, ValidatorStage, ValidatorSummary};
use crate::wire::batch_wire_len;
use crate::{PipelineError, Result};
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

const STAGE: &str = "coordinator";

// Independent random streams per participant
const COORDINATOR_STREAM: u32 = 0;
const VALIDATOR_STREAM: u32 = 1;
const TALLY_STREAM: u32 = 2;

/// Lifecycle of the coordinator, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Spawning,
    AwaitingReadiness,
    Distributing,
    AwaitingStats,
    CollectingVotes,
    Reporting,
    Terminated,
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorPhase::Spawning => "spawning",
            CoordinatorPhase::AwaitingReadiness => "awaiting-readiness",
            CoordinatorPhase::Distributing => "distributing",
            CoordinatorPhase::AwaitingStats => "awaiting-stats",
            CoordinatorPhase::CollectingVotes => "collecting-votes",
            CoordinatorPhase::Reporting => "reporting",
            CoordinatorPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Everything a finished election produced
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionOutcome {
    /// The generated batch, annotated with what the coordinator learned
    pub batch: VoterBatch,
    pub stats: TallyStats,
    /// Votes in arrival order
    pub votes: Vec<VoteEvent>,
    pub totals: PartyTotals,
    pub winner: Option<Winner>,
    /// Where the statistics were persisted, if anywhere
    pub report_path: Option<PathBuf>,
    /// Highest number of simultaneous gate holders seen during the run
    pub peak_gate_occupancy: usize,
}

/// Runs one election from a validated configuration
#[derive(Debug)]
pub struct Coordinator {
    config: SimulationConfig,
    sink: Box<dyn ReportSink>,
}

impl Coordinator {
    /// Validate `config` and prepare a run; nothing is spawned yet
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate_election()?;
        let sink: Box<dyn ReportSink> = if config.election.write_report {
            let path = config
                .election
                .report
                .clone()
                .unwrap_or_else(default_report_path);
            Box::new(FileReportSink::new(path))
        } else {
            Box::new(NoReport)
        };
        Ok(Self { config, sink })
    }

    /// Replace where the tally statistics are persisted
    pub fn with_report_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the election to completion
    pub async fn run(self) -> Result<ElectionOutcome> {
        let Coordinator { config, sink } = self;
        let voters = config.election.voter_count();
        let random = config.random_source();
        let breaks = BreakPolicy::new(config.break_probability, config.timing.break_hold)?;
        info!(
            stage = STAGE,
            phase = %CoordinatorPhase::Spawning,
            voters,
            parties = config.election.parties,
            break_probability = breaks.probability(),
            seed = ?random.seed(),
            "coordinator is setting up the election"
        );

        let gate = Arc::new(SharedGate::new());
        let barrier = ReadinessBarrier::new();
        let router = SignalRouter::new();
        let (to_validator, validator_in) =
            channel("coordinator->validator", config.channel_buffer)?;
        // holds a whole batch: the tally reads only after the validator has written everything
        let (validator_out, tally_in) = channel(
            "validator->tally",
            batch_wire_len(voters).max(config.channel_buffer),
        )?;
        let (tally_out, from_tally) = channel("tally->coordinator", config.channel_buffer)?;

        let tally = TallyStage::new(
            router.register("tally"),
            tally_in,
            tally_out,
            barrier.participant("tally"),
            gate.clone(),
            random.stream(TALLY_STREAM),
            TallySettings {
                parties: config.election.parties,
                preparation: config.timing.preparation,
                counting: config.timing.counting,
                vote_casting: config.timing.vote_casting,
                breaks,
            },
        );
        let tally_id = tally.id();
        let validator = ValidatorStage::new(
            validator_in,
            validator_out,
            barrier.participant("validator"),
            router.clone(),
            gate.clone(),
            random.stream(VALIDATOR_STREAM),
            ValidatorSettings {
                validity_probability: config.election.validity_probability,
                preparation: config.timing.preparation,
                validation: config.timing.validation,
                breaks,
            },
        )?;

        let mut validator_task =
            tokio::spawn(validator.run().instrument(info_span!("stage", name = "validator")));
        let mut tally_task =
            tokio::spawn(tally.run().instrument(info_span!("stage", name = "tally")));

        let session = Session {
            voters,
            parties: config.election.parties,
            to_validator: Some(to_validator),
            from_tally,
            barrier,
            gate: gate.clone(),
            rng: random.stream(COORDINATOR_STREAM),
            breaks,
            final_count: config.timing.final_count,
            tally: tally_id,
            sink,
        };
        let drive = session
            .drive()
            .instrument(info_span!("stage", name = STAGE));
        tokio::pin!(drive);

        let mut validator_summary: Option<ValidatorSummary> = None;
        let mut tally_summary: Option<TallySummary> = None;
        let driven = loop {
            tokio::select! {
                biased;
                joined = &mut validator_task, if validator_summary.is_none() => {
                    match settle("validator", joined) {
                        Ok(summary) => validator_summary = Some(summary),
                        Err(err) => {
                            gate.close();
                            tally_task.abort();
                            return Err(err);
                        }
                    }
                }
                joined = &mut tally_task, if tally_summary.is_none() => {
                    match settle("tally", joined) {
                        Ok(summary) => tally_summary = Some(summary),
                        Err(err) => {
                            gate.close();
                            validator_task.abort();
                            return Err(err);
                        }
                    }
                }
                result = &mut drive => break result,
            }
        };

        let mut outcome = match driven {
            Ok(outcome) => outcome,
            Err(err) => {
                gate.close();
                if validator_summary.is_none() {
                    if let Some(root) = stage_failure("validator", validator_task).await {
                        return Err(root);
                    }
                }
                if tally_summary.is_none() {
                    if let Some(root) = stage_failure("tally", tally_task).await {
                        return Err(root);
                    }
                }
                return Err(err);
            }
        };

        let validator_summary = match validator_summary {
            Some(summary) => summary,
            None => settle("validator", validator_task.await)?,
        };
        let tally_summary = match tally_summary {
            Some(summary) => summary,
            None => settle("tally", tally_task.await)?,
        };
        gate.close();
        debug!(
            stage = STAGE,
            validated = validator_summary.valid,
            votes_cast = tally_summary.votes_cast,
            "both stages finished"
        );
        outcome.peak_gate_occupancy = gate.peak_occupancy();
        info!(stage = STAGE, phase = %CoordinatorPhase::Terminated, "election is over");
        Ok(outcome)
    }
}

fn settle<T>(stage: &str, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.map_err(|e| PipelineError::StageFailed {
        stage: stage.to_string(),
        message: e.to_string(),
    })?
}

/// The stage's own error, if it failed; a stage still running is cancelled
async fn stage_failure<T>(stage: &str, task: JoinHandle<Result<T>>) -> Option<PipelineError> {
    task.abort();
    match task.await {
        Ok(Err(err)) => Some(err),
        Ok(Ok(_)) => None,
        Err(e) if e.is_panic() => Some(PipelineError::StageFailed {
            stage: stage.to_string(),
            message: e.to_string(),
        }),
        Err(_) => None,
    }
}

/// Coordinator-side state for one run
#[derive(Debug)]
struct Session {
    voters: usize,
    parties: u8,
    to_validator: Option<ChannelWriter>,
    from_tally: ChannelReader,
    barrier: ReadinessBarrier,
    gate: Arc<SharedGate>,
    rng: StdRng,
    breaks: BreakPolicy,
    final_count: DelayRange,
    tally: StageId,
    sink: Box<dyn ReportSink>,
}

impl Session {
    fn enter(&self, phase: CoordinatorPhase) {
        info!(stage = STAGE, phase = %phase, "coordinator entering phase");
    }

    async fn checkpoint(&mut self) -> Result<()> {
        self.breaks
            .visit(&self.gate, STAGE, &mut self.rng)
            .await
            .map(|_| ())
    }

    async fn drive(mut self) -> Result<ElectionOutcome> {
        self.enter(CoordinatorPhase::AwaitingReadiness);
        info!(stage = STAGE, "coordinator is waiting for the stages to be ready");
        self.barrier.await_all(2).await?;

        self.enter(CoordinatorPhase::Distributing);
        self.checkpoint().await?;
        let mut batch = self.generate_batch()?;
        info!(stage = STAGE, voters = batch.len(), "coordinator is sending the voters to the validator");
        for record in batch.iter() {
            debug!(stage = STAGE, "\tid. {}", record.id());
        }
        if let Some(mut writer) = self.to_validator.take() {
            writer.send(&self.tally).await?;
            writer.send_batch(&batch).await?;
            writer.close().await?;
        }

        self.enter(CoordinatorPhase::AwaitingStats);
        let stats: TallyStats = self.from_tally.recv().await?;
        if stats.total() != batch.len() as u64 {
            return Err(PipelineError::malformed(
                self.from_tally.name(),
                format!(
                    "statistics cover {} voters but the batch has {}",
                    stats.total(),
                    batch.len()
                ),
            ));
        }
        info!(
            stage = STAGE,
            valid = stats.valid,
            invalid = stats.invalid,
            "coordinator has received the statistics"
        );
        let report_path = self.sink.persist(&stats)?;
        self.checkpoint().await?;

        self.enter(CoordinatorPhase::CollectingVotes);
        let votes = self.collect_votes(&mut batch, stats.valid).await?;
        let mut totals = PartyTotals::new(self.parties);
        for vote in &votes {
            totals.record(vote.party)?;
        }
        // every voter without a vote was rejected by the validator
        for record in batch.records_mut() {
            if record.validity().is_none() {
                record.set_validity(false);
            }
        }
        self.checkpoint().await?;

        self.enter(CoordinatorPhase::Reporting);
        info!(stage = STAGE, "coordinator is doing the final count");
        pause(&mut self.rng, &self.final_count).await;
        for (party, count) in totals.iter() {
            info!(stage = STAGE, %party, votes = count, "party {} got {} votes", party, count);
        }
        let winner = totals.winner();
        match winner {
            Some(w) if totals.total() > 0 => {
                info!(stage = STAGE, party = %w.party, votes = w.votes, "the winner is party {}", w.party)
            }
            _ => warn!(stage = STAGE, "no valid votes were cast"),
        }

        Ok(ElectionOutcome {
            batch,
            stats,
            votes,
            totals,
            winner,
            report_path,
            peak_gate_occupancy: 0,
        })
    }

    /// Fresh batch of distinct ids drawn from the voter id range
    fn generate_batch(&mut self) -> Result<VoterBatch> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(self.voters)
            .map_err(|source| PipelineError::ResourceExhaustion {
                what: "voter batch",
                requested: self.voters,
                source,
            })?;
        let offsets = rand::seq::index::sample(&mut self.rng, MAX_VOTERS as usize, self.voters);
        for offset in offsets.iter() {
            let id = VoterId::new(MIN_VOTER_ID + offset as u32)
                .ok_or_else(|| PipelineError::configuration("voter id range includes zero"))?;
            records.push(VoterRecord::new(id));
        }
        Ok(VoterBatch::from_records(records))
    }

    /// Read exactly `expected` votes, checking each against the batch
    async fn collect_votes(&mut self, batch: &mut VoterBatch, expected: u32) -> Result<Vec<VoteEvent>> {
        let index: HashMap<VoterId, usize> = batch
            .iter()
            .enumerate()
            .map(|(i, record)| (record.id(), i))
            .collect();
        let mut votes = Vec::new();
        votes
            .try_reserve_exact(expected as usize)
            .map_err(|source| PipelineError::ResourceExhaustion {
                what: "vote list",
                requested: expected as usize,
                source,
            })?;

        for _ in 0..expected {
            let vote: VoteEvent = self.from_tally.recv().await?;
            let channel = self.from_tally.name();
            if vote.party.get() > self.parties {
                return Err(PipelineError::malformed(
                    channel,
                    format!("vote for party {} outside 1..={}", vote.party, self.parties),
                ));
            }
            let position = *index.get(&vote.voter).ok_or_else(|| {
                PipelineError::malformed(channel, format!("vote from unknown voter {}", vote.voter))
            })?;
            let record = &mut batch.records_mut()[position];
            if record.validity().is_some() {
                return Err(PipelineError::malformed(
                    channel,
                    format!("voter {} voted twice", vote.voter),
                ));
            }
            record.set_validity(true);
            record
                .assign_party(vote.party)
                .map_err(|reason| PipelineError::malformed(channel, reason))?;
            debug!(stage = STAGE, voter = %vote.voter, party = %vote.party, "vote received");
            votes.push(vote);
        }
        Ok(votes)
    }
}

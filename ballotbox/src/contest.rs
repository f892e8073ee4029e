//! Egg-hunt contest: a judge and one inspector per group of areas
//!
//! The judge routes every contestant to the inspector supervising their area,
//! then starts each inspector with a directed notification carrying the number
//! of contestants it was sent. Inspectors run their contests concurrently and
//! the judge reads their results in the order they finish.

use crate::channel::{channel, ChannelReader, ChannelWriter};
use crate::config::{check_text, SimulationConfig, TimingConfig};
use crate::random::pause;
use crate::wire::{get_text, put_text, DecodeError, WireRecord, TEXT_FIELD_LEN};
use crate::{PipelineError, Result};
use bytes::{Buf, BufMut, BytesMut};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Most eggs a single contestant can find
pub const MAX_EGGS: u32 = 100;

const JUDGE_STREAM: u32 = 0;

/// A registered contestant and the area they compete in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contestant {
    name: String,
    area: String,
}

impl Contestant {
    pub fn new(name: impl Into<String>, area: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let area = area.into();
        check_text("contestant name", &name)?;
        check_text("area", &area)?;
        Ok(Self { name, area })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn area(&self) -> &str {
        &self.area
    }
}

impl WireRecord for Contestant {
    const SIZE: usize = 2 * TEXT_FIELD_LEN;

    fn encode(&self, buf: &mut BytesMut) {
        put_text(buf, &self.name);
        put_text(buf, &self.area);
    }

    fn decode<B: Buf>(buf: &mut B) -> std::result::Result<Self, DecodeError> {
        let name = get_text(buf)?;
        let area = get_text(buf)?;
        Ok(Self { name, area })
    }
}

/// Eggs found by one contestant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestResult {
    pub name: String,
    pub eggs: u32,
}

impl WireRecord for ContestResult {
    const SIZE: usize = TEXT_FIELD_LEN + 4;

    fn encode(&self, buf: &mut BytesMut) {
        put_text(buf, &self.name);
        buf.put_u32(self.eggs);
    }

    fn decode<B: Buf>(buf: &mut B) -> std::result::Result<Self, DecodeError> {
        let name = get_text(buf)?;
        let eggs = buf.get_u32();
        Ok(Self { name, eggs })
    }
}

impl fmt::Display for ContestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} eggs)", self.name, self.eggs)
    }
}

/// Results of one inspector, numbered from 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorReport {
    pub inspector: usize,
    pub areas: Vec<String>,
    pub results: Vec<ContestResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContestOutcome {
    /// One report per inspector, in the order they finished
    pub reports: Vec<InspectorReport>,
    /// Contestants whose area no inspector supervises
    pub skipped: Vec<Contestant>,
    /// First contestant with the strictly highest egg count
    pub winner: Option<ContestResult>,
}

impl ContestOutcome {
    /// All results in the order the judge read them
    pub fn results(&self) -> impl Iterator<Item = &ContestResult> {
        self.reports.iter().flat_map(|r| r.results.iter())
    }
}

/// Runs contests for the configured inspectors
#[derive(Debug, Clone)]
pub struct Judge {
    config: SimulationConfig,
}

impl Judge {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate_contest()?;
        Ok(Self { config })
    }

    pub async fn run(&self, contestants: Vec<Contestant>) -> Result<ContestOutcome> {
        if contestants.is_empty() {
            return Err(PipelineError::configuration(
                "No contestants registered, add contestants first",
            ));
        }
        let random = self.config.random_source();
        let mut rng = random.stream(JUDGE_STREAM);
        let inspectors = &self.config.contest.inspectors;

        // route by area
        let mut area_owner = HashMap::new();
        for (index, areas) in inspectors.iter().enumerate() {
            for area in areas {
                area_owner.insert(area.as_str(), index);
            }
        }
        let mut assigned: Vec<Vec<Contestant>> = vec![Vec::new(); inspectors.len()];
        let mut skipped = Vec::new();
        for contestant in contestants {
            match area_owner.get(contestant.area()) {
                Some(&index) => assigned[index].push(contestant),
                None => {
                    warn!(
                        name = %contestant.name(),
                        area = %contestant.area(),
                        "no inspector supervises this area, contestant skipped"
                    );
                    skipped.push(contestant);
                }
            }
        }

        let mut tasks = JoinSet::new();
        let mut dispatch = Vec::with_capacity(inspectors.len());
        let mut result_readers: Vec<Option<ChannelReader>> = Vec::with_capacity(inspectors.len());
        for (index, areas) in inspectors.iter().enumerate() {
            let number = index + 1;
            let count = assigned[index].len();
            let (to_inspector, inbound) = channel(
                format!("judge->inspector-{}", number),
                (count * Contestant::SIZE).max(self.config.channel_buffer),
            )?;
            let (outbound, from_inspector) = channel(
                format!("inspector-{}->judge", number),
                (count * ContestResult::SIZE).max(self.config.channel_buffer),
            )?;
            let (start_tx, start_rx) = oneshot::channel();
            let inspector = Inspector {
                number,
                start: start_rx,
                inbound,
                outbound,
                rng: random.stream(number as u32),
                timing: self.config.timing.clone(),
            };
            tasks.spawn(
                inspector
                    .run()
                    .instrument(info_span!("stage", name = "inspector", number, areas = ?areas)),
            );
            dispatch.push((to_inspector, start_tx));
            result_readers.push(Some(from_inspector));
        }

        info!("the judge is handing out the contestants");
        pause(&mut rng, &self.config.timing.contest_dispatch).await;
        for (index, ((mut writer, start), group)) in dispatch.into_iter().zip(&assigned).enumerate() {
            for contestant in group {
                writer.send(contestant).await?;
            }
            writer.close().await?;
            start.send(group.len() as u32).map_err(|_| PipelineError::StageFailed {
                stage: format!("inspector-{}", index + 1),
                message: "inspector exited before it was started".to_string(),
            })?;
            debug!(inspector = index + 1, contestants = group.len(), "inspector started");
        }

        let mut reports = Vec::with_capacity(inspectors.len());
        while let Some(joined) = tasks.join_next().await {
            let number = joined
                .map_err(|e| PipelineError::StageFailed {
                    stage: "inspector".to_string(),
                    message: e.to_string(),
                })??;
            let index = number - 1;
            let mut reader = result_readers[index].take().ok_or_else(|| {
                PipelineError::StageFailed {
                    stage: format!("inspector-{}", number),
                    message: "reported twice".to_string(),
                }
            })?;
            let mut results = Vec::with_capacity(assigned[index].len());
            for _ in 0..assigned[index].len() {
                results.push(reader.recv::<ContestResult>().await?);
            }
            info!(inspector = number, "the judge has the results of inspector {}", number);
            reports.push(InspectorReport {
                inspector: number,
                areas: inspectors[index].clone(),
                results,
            });
        }

        let mut winner: Option<ContestResult> = None;
        for result in reports.iter().flat_map(|r| r.results.iter()) {
            match &winner {
                Some(best) if result.eggs <= best.eggs => {}
                _ => winner = Some(result.clone()),
            }
        }
        if let Some(w) = &winner {
            info!(name = %w.name, eggs = w.eggs, "the winner is {}", w);
        }

        Ok(ContestOutcome {
            reports,
            skipped,
            winner,
        })
    }
}

/// Supervises the contest in a group of areas
#[derive(Debug)]
struct Inspector {
    number: usize,
    start: oneshot::Receiver<u32>,
    inbound: ChannelReader,
    outbound: ChannelWriter,
    rng: StdRng,
    timing: TimingConfig,
}

impl Inspector {
    /// Returns its own number once every result is written
    async fn run(self) -> Result<usize> {
        let Inspector {
            number,
            start,
            mut inbound,
            mut outbound,
            mut rng,
            timing,
        } = self;
        let stage = format!("inspector-{}", number);

        let count = start.await.map_err(|_| PipelineError::StageFailed {
            stage: stage.clone(),
            message: "judge went away before starting the contest".to_string(),
        })?;
        let mut contestants = Vec::with_capacity(count as usize);
        for _ in 0..count {
            contestants.push(inbound.recv::<Contestant>().await?);
        }
        info!(stage = %stage, contestants = count, "{} has received the contestants", stage);
        for contestant in &contestants {
            debug!(stage = %stage, "\t{} ({})", contestant.name(), contestant.area());
        }

        if !contestants.is_empty() {
            pause(&mut rng, &timing.contest_preparation).await;
            info!(stage = %stage, "the contest has started");
            pause(&mut rng, &timing.contest_duration).await;
            info!(stage = %stage, "the contest is over, counting eggs");
            pause(&mut rng, &timing.contest_summary).await;
        }

        for contestant in &contestants {
            let result = ContestResult {
                name: contestant.name().to_string(),
                eggs: rng.random_range(1..=MAX_EGGS),
            };
            debug!(stage = %stage, "{}", result);
            outbound.send(&result).await?;
        }
        outbound.close().await?;
        Ok(number)
    }
}

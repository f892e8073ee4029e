//! Simulation configuration
//!
//! Configuration is layered with figment, later sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `BALLOTBOX_` (`__` separates nested keys,
//!    e.g. `BALLOTBOX_ELECTION__PARTIES=4`)
//! 4. Command line overrides
//!
//! Values are validated before any stage is created.

use crate::random::RandomSource;
use crate::wire::TEXT_FIELD_LEN;
use crate::{PipelineError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lowest voter id handed out
pub const MIN_VOTER_ID: u32 = 10_000;
/// Highest voter id handed out
pub const MAX_VOTER_ID: u32 = 99_999;
/// Largest batch: ids are unique, so the id range bounds the batch
pub const MAX_VOTERS: i64 = (MAX_VOTER_ID - MIN_VOTER_ID + 1) as i64;
/// Default number of parties on the ballot
pub const DEFAULT_PARTIES: u8 = 6;
/// Default chance that a voter's identity checks out
pub const DEFAULT_VALIDITY_PROBABILITY: f64 = 0.8;
/// Default chance that a stage takes a break at a checkpoint
pub const DEFAULT_BREAK_PROBABILITY: f64 = 0.3;
/// Default pipe buffer of a channel, in bytes
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;
/// Prefix of environment variables read by [`SimulationConfig::load`]
pub const ENV_PREFIX: &str = "BALLOTBOX_";

/// Trait for configuration sections that can be checked before use
pub trait ValidatedConfig {
    /// Validate the configuration, returning a configuration error if invalid
    fn validate(&self) -> Result<()>;

    /// Get a description of what this configuration controls
    fn description() -> &'static str;
}

/// Inclusive range of simulated delays, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_micros: u64,
    pub max_micros: u64,
}

impl DelayRange {
    /// No delay at all
    pub const ZERO: DelayRange = DelayRange {
        min_micros: 0,
        max_micros: 0,
    };

    pub fn from_micros(min: u64, max: u64) -> Self {
        Self {
            min_micros: min,
            max_micros: max,
        }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::from_micros(min * 1_000, max * 1_000)
    }

    pub fn fixed_millis(millis: u64) -> Self {
        Self::from_millis(millis, millis)
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.min_micros > self.max_micros {
            return Err(PipelineError::configuration(format!(
                "Delay '{}' has min {}µs above max {}µs",
                name, self.min_micros, self.max_micros
            )));
        }
        Ok(())
    }
}

/// Simulated durations of every phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Stage setup before signalling readiness
    pub preparation: DelayRange,
    /// Identity checks in the validator
    pub validation: DelayRange,
    /// Tabulating stats in the tally
    pub counting: DelayRange,
    /// Casting a single vote
    pub vote_casting: DelayRange,
    /// Time spent holding the shared gate
    pub break_hold: DelayRange,
    /// Coordinator's final count before announcing
    pub final_count: DelayRange,
    /// Judge's pause before handing out contestants
    pub contest_dispatch: DelayRange,
    /// Inspector setup after receiving contestants
    pub contest_preparation: DelayRange,
    /// Length of the contest in one area
    pub contest_duration: DelayRange,
    /// Inspector summarising results
    pub contest_summary: DelayRange,
}

impl TimingConfig {
    /// All delays zero, for tests and quick runs
    pub fn instant() -> Self {
        Self {
            preparation: DelayRange::ZERO,
            validation: DelayRange::ZERO,
            counting: DelayRange::ZERO,
            vote_casting: DelayRange::ZERO,
            break_hold: DelayRange::ZERO,
            final_count: DelayRange::ZERO,
            contest_dispatch: DelayRange::ZERO,
            contest_preparation: DelayRange::ZERO,
            contest_duration: DelayRange::ZERO,
            contest_summary: DelayRange::ZERO,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            preparation: DelayRange::from_millis(1_000, 3_000),
            validation: DelayRange::from_millis(1_000, 3_000),
            counting: DelayRange::from_millis(1_000, 3_000),
            vote_casting: DelayRange::from_micros(150, 350),
            break_hold: DelayRange::fixed_millis(5_000),
            final_count: DelayRange::fixed_millis(2_000),
            contest_dispatch: DelayRange::fixed_millis(2_000),
            contest_preparation: DelayRange::from_millis(1_000, 3_000),
            contest_duration: DelayRange::from_millis(1_000, 5_000),
            contest_summary: DelayRange::from_millis(1_000, 3_000),
        }
    }
}

impl ValidatedConfig for TimingConfig {
    fn validate(&self) -> Result<()> {
        self.preparation.check("preparation")?;
        self.validation.check("validation")?;
        self.counting.check("counting")?;
        self.vote_casting.check("vote_casting")?;
        self.break_hold.check("break_hold")?;
        self.final_count.check("final_count")?;
        self.contest_dispatch.check("contest_dispatch")?;
        self.contest_preparation.check("contest_preparation")?;
        self.contest_duration.check("contest_duration")?;
        self.contest_summary.check("contest_summary")
    }

    fn description() -> &'static str {
        "Simulated phase durations"
    }
}

/// Election pipeline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Number of voters to generate; must be in `1..=MAX_VOTERS`
    pub voters: i64,
    /// Number of parties on the ballot
    pub parties: u8,
    /// Chance that a voter passes validation
    pub validity_probability: f64,
    /// Where to write the tally report; a temp file when unset
    pub report: Option<PathBuf>,
    /// Whether to write the tally report at all
    pub write_report: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            voters: 0,
            parties: DEFAULT_PARTIES,
            validity_probability: DEFAULT_VALIDITY_PROBABILITY,
            report: None,
            write_report: true,
        }
    }
}

impl ElectionConfig {
    /// Voter count once validated
    pub fn voter_count(&self) -> usize {
        self.voters.clamp(0, MAX_VOTERS) as usize
    }
}

impl ValidatedConfig for ElectionConfig {
    fn validate(&self) -> Result<()> {
        if self.voters <= 0 {
            return Err(PipelineError::configuration(format!(
                "Voter count must be a positive integer, got {}",
                self.voters
            )));
        }
        if self.voters > MAX_VOTERS {
            return Err(PipelineError::configuration(format!(
                "Voter count {} exceeds the maximum of {}",
                self.voters, MAX_VOTERS
            )));
        }
        if self.parties == 0 {
            return Err(PipelineError::configuration(
                "At least one party must be on the ballot",
            ));
        }
        check_probability("validity_probability", self.validity_probability)
    }

    fn description() -> &'static str {
        "Voter batch size, ballot and validation parameters"
    }
}

/// Contest parameters: the areas each inspector supervises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestConfig {
    pub inspectors: Vec<Vec<String>>,
}

impl Default for ContestConfig {
    fn default() -> Self {
        let areas = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            inspectors: vec![
                areas(&["Barátfa", "Lovas", "Kígyós-patak", "Káposztás kert"]),
                areas(&["Szula", "Malom telek", "Páskom"]),
            ],
        }
    }
}

impl ValidatedConfig for ContestConfig {
    fn validate(&self) -> Result<()> {
        if self.inspectors.is_empty() {
            return Err(PipelineError::configuration(
                "The contest needs at least one inspector",
            ));
        }
        let mut seen = HashSet::new();
        for (index, areas) in self.inspectors.iter().enumerate() {
            if areas.is_empty() {
                return Err(PipelineError::configuration(format!(
                    "Inspector {} has no areas",
                    index + 1
                )));
            }
            for area in areas {
                check_text("area", area)?;
                if !seen.insert(area.as_str()) {
                    return Err(PipelineError::configuration(format!(
                        "Area '{}' is assigned to more than one inspector",
                        area
                    )));
                }
            }
        }
        Ok(())
    }

    fn description() -> &'static str {
        "Areas supervised by each contest inspector"
    }
}

/// Complete configuration shared by both simulations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for reproducible runs; OS randomness when unset
    pub seed: Option<u64>,
    /// Chance that a stage takes a break at each checkpoint
    pub break_probability: f64,
    /// Pipe buffer of each channel, in bytes
    pub channel_buffer: usize,
    pub timing: TimingConfig,
    pub election: ElectionConfig,
    pub contest: ContestConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            break_probability: DEFAULT_BREAK_PROBABILITY,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            timing: TimingConfig::default(),
            election: ElectionConfig::default(),
            contest: ContestConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Configuration for an election of `voters` with default settings
    pub fn for_voters(voters: i64) -> Self {
        let mut config = Self::default();
        config.election.voters = voters;
        config
    }

    /// Load defaults, then `file`, then `BALLOTBOX_` variables, then `overrides`
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(SimulationConfig::default()));

        if let Some(path) = file {
            if !path.is_file() {
                return Err(PipelineError::configuration(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading configuration file {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        let config: SimulationConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;
        debug!(seed = ?config.seed, voters = config.election.voters, "configuration loaded");
        Ok(config)
    }

    /// Random source derived from the seed
    pub fn random_source(&self) -> RandomSource {
        match self.seed {
            Some(seed) => RandomSource::seeded(seed),
            None => RandomSource::from_os(),
        }
    }

    /// Settings shared by both simulations
    pub fn validate_common(&self) -> Result<()> {
        check_probability("break_probability", self.break_probability)?;
        if self.channel_buffer == 0 {
            return Err(PipelineError::configuration(
                "channel_buffer must be at least one byte",
            ));
        }
        self.timing.validate()
    }

    /// Everything the election needs
    pub fn validate_election(&self) -> Result<()> {
        self.election.validate()?;
        self.validate_common()
    }

    /// Everything the contest needs
    pub fn validate_contest(&self) -> Result<()> {
        self.contest.validate()?;
        self.validate_common()
    }
}

/// Command line values layered over every other source; unset fields are skipped
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingConfig>,
    pub election: ElectionOverrides,
}

/// Election values from the command line
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElectionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parties: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_report: Option<bool>,
}

pub(crate) fn check_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::configuration(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Names travel in fixed text fields, so they must fit one
pub(crate) fn check_text(what: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(PipelineError::configuration(format!(
            "{} must not be empty",
            what
        )));
    }
    if text.len() >= TEXT_FIELD_LEN || text.contains('\0') {
        return Err(PipelineError::configuration(format!(
            "{} '{}' must be under {} bytes without NUL characters",
            what, text, TEXT_FIELD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_follow_the_simulation() {
        let config = SimulationConfig::default();
        assert_eq!(config.election.parties, 6);
        assert_eq!(config.election.validity_probability, 0.8);
        assert_eq!(config.break_probability, 0.3);
        assert_eq!(config.timing.break_hold, DelayRange::fixed_millis(5_000));
        assert_eq!(config.contest.inspectors.len(), 2);
        assert!(config.validate_common().is_ok());
    }

    #[test]
    fn test_voter_count_bounds() {
        for voters in [0, -3] {
            let err = SimulationConfig::for_voters(voters)
                .validate_election()
                .unwrap_err();
            assert!(matches!(err, PipelineError::Configuration { .. }));
            assert!(err.to_string().contains("positive"));
        }
        assert!(SimulationConfig::for_voters(MAX_VOTERS + 1)
            .validate_election()
            .is_err());
        assert!(SimulationConfig::for_voters(1).validate_election().is_ok());
        assert!(SimulationConfig::for_voters(MAX_VOTERS)
            .validate_election()
            .is_ok());
    }

    #[test]
    fn test_invalid_probabilities_and_ranges() {
        let mut config = SimulationConfig::for_voters(5);
        config.election.validity_probability = 1.5;
        assert!(config.validate_election().is_err());

        let mut config = SimulationConfig::for_voters(5);
        config.break_probability = f64::NAN;
        assert!(config.validate_election().is_err());

        let mut config = SimulationConfig::for_voters(5);
        config.timing.counting = DelayRange::from_millis(3, 1);
        let err = config.validate_election().unwrap_err();
        assert!(err.to_string().contains("counting"));
    }

    #[test]
    fn test_contest_areas_must_be_unique() {
        let mut config = SimulationConfig::default();
        config.contest.inspectors = vec![vec!["Lovas".into()], vec!["Lovas".into()]];
        assert!(config.validate_contest().is_err());

        config.contest.inspectors = vec![vec![]];
        assert!(config.validate_contest().is_err());

        config.contest.inspectors = vec![vec!["x".repeat(TEXT_FIELD_LEN)]];
        assert!(config.validate_contest().is_err());
    }

    #[test]
    #[serial]
    fn test_load_layers_file_env_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "seed = 11\nbreak_probability = 0.0\n\n[election]\nvoters = 20\nparties = 3\n"
        )
        .unwrap();

        std::env::set_var("BALLOTBOX_ELECTION__PARTIES", "4");
        let overrides = ConfigOverrides {
            election: ElectionOverrides {
                voters: Some(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let loaded = SimulationConfig::load(Some(file.path()), &overrides);
        std::env::remove_var("BALLOTBOX_ELECTION__PARTIES");

        let config = loaded.unwrap();
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.break_probability, 0.0);
        assert_eq!(config.election.parties, 4);
        assert_eq!(config.election.voters, 50);
        assert_eq!(config.election.validity_probability, 0.8);
    }

    #[test]
    #[serial]
    fn test_load_instant_timing_override() {
        let overrides = ConfigOverrides {
            timing: Some(TimingConfig::instant()),
            ..Default::default()
        };
        let config = SimulationConfig::load(None, &overrides).unwrap();
        assert_eq!(config.timing, TimingConfig::instant());
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = SimulationConfig::load(
            Some(Path::new("/definitely/not/here.toml")),
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }
}

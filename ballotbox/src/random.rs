//! Injectable randomness for the stages
//!
//! Every stage draws from its own generator. With a seed the whole simulation
//! is reproducible; without one each generator is seeded from the OS.

use crate::config::DelayRange;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of per-stage random number generators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RandomSource {
    seed: Option<u64>,
}

impl RandomSource {
    /// Reproducible source
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    /// OS-seeded source
    pub fn from_os() -> Self {
        Self { seed: None }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Generator for one participant; distinct indices get distinct streams
    pub fn stream(&self, index: u32) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (u64::from(index) << 16)),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Sample a delay uniformly from `range`
pub fn sample_delay<R: Rng + ?Sized>(rng: &mut R, range: &DelayRange) -> Duration {
    if range.min_micros >= range.max_micros {
        return Duration::from_micros(range.min_micros);
    }
    Duration::from_micros(rng.random_range(range.min_micros..=range.max_micros))
}

/// Sleep for a delay drawn from `range`; zero-length ranges return at once
pub async fn pause<R: Rng + ?Sized>(rng: &mut R, range: &DelayRange) {
    let delay = sample_delay(rng, range);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

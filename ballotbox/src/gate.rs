//! The shared "rest area": a capacity-1 gate every stage contends for
//!
//! The gate is independent of the data path. Stages visit it at fixed
//! checkpoints through a [`BreakPolicy`]; whether a visit happens is random.
//! A pass is not reentrant: acquiring the gate again while holding a
//! [`GatePass`] waits forever.

use crate::config::{check_probability, DelayRange};
use crate::random::pause;
use crate::{PipelineError, Result};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

/// Capacity-1 mutual-exclusion resource
#[derive(Debug)]
pub struct SharedGate {
    permits: Semaphore,
    occupancy: AtomicUsize,
    peak: AtomicUsize,
}

impl SharedGate {
    pub const CAPACITY: usize = 1;

    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(Self::CAPACITY),
            occupancy: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Wait until the gate is free, then occupy it
    pub async fn acquire(&self) -> Result<GatePass<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::ResourceSetup {
                resource: "shared gate",
                message: "the gate has been closed".to_string(),
            })?;
        let now = self.occupancy.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(GatePass {
            gate: self,
            _permit: permit,
        })
    }

    /// Number of current holders (0 or 1)
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::SeqCst)
    }

    /// Highest occupancy ever observed
    pub fn peak_occupancy(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Refuse further acquisitions; current holders are unaffected
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

impl Default for SharedGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of occupancy; releasing or dropping it frees the gate for one waiter
#[derive(Debug)]
#[must_use = "the gate is released as soon as the pass is dropped"]
pub struct GatePass<'a> {
    gate: &'a SharedGate,
    _permit: SemaphorePermit<'a>,
}

impl GatePass<'_> {
    pub fn release(self) {}
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        // occupancy drops before the permit is handed to the next waiter
        self.gate.occupancy.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a stage uses the gate at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakPolicy {
    probability: f64,
    hold: DelayRange,
}

impl BreakPolicy {
    /// Break with chance `probability` at each checkpoint, holding the gate for `hold`
    pub fn new(probability: f64, hold: DelayRange) -> Result<Self> {
        check_probability("break_probability", probability)?;
        Ok(Self { probability, hold })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Never visit the gate
    pub fn never() -> Self {
        Self {
            probability: 0.0,
            hold: DelayRange::ZERO,
        }
    }

    /// Maybe take a break: acquire, hold for a sampled delay, release
    ///
    /// Returns whether the stage went out.
    pub async fn visit<R: Rng + ?Sized>(
        &self,
        gate: &SharedGate,
        stage: &str,
        rng: &mut R,
    ) -> Result<bool> {
        if !rng.random_bool(self.probability) {
            return Ok(false);
        }
        info!(stage = %stage, "{} wants to go out...", stage);
        let pass = gate.acquire().await?;
        info!(stage = %stage, "{} went out to take a break.", stage);
        pause(rng, &self.hold).await;
        info!(stage = %stage, "{} came back.", stage);
        pass.release();
        Ok(true)
    }
}

//! One-shot readiness barrier between the coordinator and its stages
//!
//! Each stage holds one [`ReadySignal`]. Signalling consumes it, bumps a shared
//! counter and hands back a [`GoAhead`] the stage waits on. The coordinator's
//! [`ReadinessBarrier::await_all`] compares against the counter's current
//! value, so signals that land before it starts waiting are still counted.

use crate::{PipelineError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
struct BarrierState {
    arrived: watch::Sender<usize>,
    released: watch::Sender<bool>,
}

/// Coordinator side of the barrier
#[derive(Debug, Clone)]
pub struct ReadinessBarrier {
    state: Arc<BarrierState>,
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        let (arrived, _) = watch::channel(0);
        let (released, _) = watch::channel(false);
        Self {
            state: Arc::new(BarrierState { arrived, released }),
        }
    }

    /// Hand out the signal for one participating stage
    pub fn participant(&self, stage: impl Into<String>) -> ReadySignal {
        ReadySignal {
            state: self.state.clone(),
            stage: stage.into(),
        }
    }

    /// Number of stages that have signalled so far
    pub fn ready_count(&self) -> usize {
        *self.state.arrived.borrow()
    }

    /// Block until `expected` stages have signalled, then let them all proceed
    pub async fn await_all(&self, expected: usize) -> Result<()> {
        let mut arrived = self.state.arrived.subscribe();
        arrived
            .wait_for(|count| *count >= expected)
            .await
            .map_err(|_| PipelineError::StageFailed {
                stage: "coordinator".to_string(),
                message: "readiness barrier dropped".to_string(),
            })?;
        debug!(expected = expected, "all stages ready");
        self.state.released.send_replace(true);
        Ok(())
    }
}

impl Default for ReadinessBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// A stage's single readiness signal
#[derive(Debug)]
pub struct ReadySignal {
    state: Arc<BarrierState>,
    stage: String,
}

impl ReadySignal {
    /// Report setup complete; can only happen once per stage
    pub fn signal_ready(self) -> GoAhead {
        self.state.arrived.send_modify(|count| *count += 1);
        debug!(stage = %self.stage, "signalled ready");
        GoAhead {
            released: self.state.released.subscribe(),
            stage: self.stage,
        }
    }
}

/// Permission to start, granted once every stage is ready
#[derive(Debug)]
pub struct GoAhead {
    released: watch::Receiver<bool>,
    stage: String,
}

impl GoAhead {
    /// Wait for the coordinator to release the barrier
    pub async fn wait(mut self) -> Result<()> {
        self.released
            .wait_for(|released| *released)
            .await
            .map_err(|_| PipelineError::StageFailed {
                stage: self.stage.clone(),
                message: "coordinator went away before releasing the barrier".to_string(),
            })?;
        Ok(())
    }
}

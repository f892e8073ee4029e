//! Identity validation stage
//!
//! Receives the tally's address and the voter batch from the coordinator,
//! marks every voter valid or invalid, forwards the annotated batch straight
//! to the tally and then tells the tally the data is waiting.

use crate::barrier::ReadySignal;
use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::{check_probability, DelayRange, MAX_VOTERS};
use crate::gate::{BreakPolicy, SharedGate};
use crate::random::pause;
use crate::signal::SignalRouter;
use crate::types::StageId;
use crate::Result;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

const STAGE: &str = "validator";

/// Tunables of the validator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorSettings {
    /// Chance that a single voter passes validation
    pub validity_probability: f64,
    pub preparation: DelayRange,
    pub validation: DelayRange,
    pub breaks: BreakPolicy,
}

/// What the validator did, returned when it exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSummary {
    pub received: usize,
    pub valid: usize,
    pub forwarded_to: StageId,
}

/// The validation stage; consumed by [`ValidatorStage::run`]
#[derive(Debug)]
pub struct ValidatorStage {
    inbound: ChannelReader,
    outbound: ChannelWriter,
    ready: ReadySignal,
    router: SignalRouter,
    gate: Arc<SharedGate>,
    rng: StdRng,
    settings: ValidatorSettings,
}

impl ValidatorStage {
    /// `outbound` is already open towards the tally when the stage is built,
    /// so readiness can never be signalled before that channel exists.
    pub fn new(
        inbound: ChannelReader,
        outbound: ChannelWriter,
        ready: ReadySignal,
        router: SignalRouter,
        gate: Arc<SharedGate>,
        rng: StdRng,
        settings: ValidatorSettings,
    ) -> Result<Self> {
        check_probability("validity_probability", settings.validity_probability)?;
        Ok(Self {
            inbound,
            outbound,
            ready,
            router,
            gate,
            rng,
            settings,
        })
    }

    pub async fn run(self) -> Result<ValidatorSummary> {
        let Self {
            mut inbound,
            mut outbound,
            ready,
            router,
            gate,
            mut rng,
            settings,
        } = self;

        info!(stage = STAGE, "validator is preparing");
        pause(&mut rng, &settings.preparation).await;
        info!(stage = STAGE, "validator is ready");
        ready.signal_ready().wait().await?;

        let tally: StageId = inbound.recv().await?;
        let mut batch = inbound.recv_batch(MAX_VOTERS as usize).await?;
        drop(inbound);

        settings.breaks.visit(&gate, STAGE, &mut rng).await?;

        info!(
            stage = STAGE,
            voters = batch.len(),
            "validator has received the data from the coordinator"
        );
        for record in batch.iter() {
            debug!(stage = STAGE, "\tid. {}", record.id());
        }

        info!(stage = STAGE, "validator is checking whether the ids are valid");
        pause(&mut rng, &settings.validation).await;
        for record in batch.records_mut() {
            record.set_validity(rng.random_bool(settings.validity_probability));
        }
        let valid = batch.iter().filter(|r| r.is_valid()).count();
        info!(stage = STAGE, valid, "validator is done with validation");

        settings.breaks.visit(&gate, STAGE, &mut rng).await?;

        info!(stage = STAGE, "validator is sending the validated data to the tally");
        outbound.send_batch(&batch).await?;
        outbound.close().await?;
        router.raise(tally)?;

        Ok(ValidatorSummary {
            received: batch.len(),
            valid,
            forwarded_to: tally,
        })
    }
}

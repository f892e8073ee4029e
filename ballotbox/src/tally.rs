//! Counting stage
//!
//! Waits for the validator's "data ready" notification, reads the validated
//! batch, reports the valid/invalid split upstream and then casts one vote per
//! valid voter, streaming each vote as soon as it is cast.

use crate::barrier::ReadySignal;
use crate::channel::{ChannelReader, ChannelWriter};
use crate::config::{DelayRange, MAX_VOTERS};
use crate::gate::{BreakPolicy, SharedGate};
use crate::random::pause;
use crate::signal::SignalInbox;
use crate::types::{PartyId, StageId, TallyStats, VoteEvent};
use crate::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

const STAGE: &str = "tally";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TallySettings {
    /// Parties on the ballot, numbered `1..=parties`
    pub parties: u8,
    pub preparation: DelayRange,
    pub counting: DelayRange,
    pub vote_casting: DelayRange,
    pub breaks: BreakPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallySummary {
    pub stats: TallyStats,
    pub votes_cast: usize,
}

/// The counting stage; consumed by [`TallyStage::run`]
#[derive(Debug)]
pub struct TallyStage {
    inbox: SignalInbox,
    inbound: ChannelReader,
    outbound: ChannelWriter,
    ready: ReadySignal,
    gate: Arc<SharedGate>,
    rng: StdRng,
    settings: TallySettings,
}

impl TallyStage {
    pub fn new(
        inbox: SignalInbox,
        inbound: ChannelReader,
        outbound: ChannelWriter,
        ready: ReadySignal,
        gate: Arc<SharedGate>,
        rng: StdRng,
        settings: TallySettings,
    ) -> Self {
        Self {
            inbox,
            inbound,
            outbound,
            ready,
            gate,
            rng,
            settings,
        }
    }

    /// Address other stages use to notify this one
    pub fn id(&self) -> StageId {
        self.inbox.id()
    }

    pub async fn run(self) -> Result<TallySummary> {
        let Self {
            inbox,
            mut inbound,
            mut outbound,
            ready,
            gate,
            mut rng,
            settings,
        } = self;
        if settings.parties == 0 {
            return Err(PipelineError::configuration(
                "At least one party must be on the ballot",
            ));
        }

        info!(stage = STAGE, "tally is preparing");
        pause(&mut rng, &settings.preparation).await;
        info!(stage = STAGE, "tally is ready");
        ready.signal_ready().wait().await?;

        settings.breaks.visit(&gate, STAGE, &mut rng).await?;

        inbox.wait().await;
        debug!(stage = STAGE, id = %inbox.id(), "data ready notification received");
        let mut batch = inbound.recv_batch(MAX_VOTERS as usize).await?;
        drop(inbound);
        info!(
            stage = STAGE,
            voters = batch.len(),
            "tally has received the validated data"
        );

        settings.breaks.visit(&gate, STAGE, &mut rng).await?;

        info!(stage = STAGE, "tally is counting");
        pause(&mut rng, &settings.counting).await;
        let stats = TallyStats::tabulate(&batch);
        outbound.send(&stats).await?;
        info!(
            stage = STAGE,
            valid = stats.valid,
            invalid = stats.invalid,
            "tally has sent the statistics"
        );

        settings.breaks.visit(&gate, STAGE, &mut rng).await?;

        info!(stage = STAGE, "voting has started");
        let mut votes_cast = 0;
        for record in batch.records_mut().iter_mut().filter(|r| r.is_valid()) {
            pause(&mut rng, &settings.vote_casting).await;
            let party = PartyId::new(rng.random_range(1..=settings.parties))
                .ok_or_else(|| PipelineError::malformed(outbound.name(), "drew party zero"))?;
            record
                .assign_party(party)
                .map_err(|reason| PipelineError::malformed(outbound.name(), reason))?;
            outbound
                .send(&VoteEvent {
                    voter: record.id(),
                    party,
                })
                .await?;
            debug!(stage = STAGE, voter = %record.id(), %party, "vote cast");
            votes_cast += 1;
        }
        outbound.close().await?;
        info!(stage = STAGE, votes_cast, "voting has finished");

        Ok(TallySummary { stats, votes_cast })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::ReadinessBarrier;
    use crate::channel::channel;
    use crate::random::RandomSource;
    use crate::signal::SignalRouter;
    use crate::types::{VoterBatch, VoterId, VoterRecord};
    use crate::wire::batch_wire_len;

    fn settings(parties: u8) -> TallySettings {
        TallySettings {
            parties,
            preparation: DelayRange::ZERO,
            counting: DelayRange::ZERO,
            vote_casting: DelayRange::ZERO,
            breaks: BreakPolicy::never(),
        }
    }

    /// Voters 10000.. with every third one invalid
    fn validated(n: u32) -> VoterBatch {
        VoterBatch::from_records(
            (0..n)
                .map(|i| {
                    let mut record = VoterRecord::new(VoterId::new(10_000 + i).unwrap());
                    record.set_validity(i % 3 != 0);
                    record
                })
                .collect(),
        )
    }

    struct Harness {
        router: SignalRouter,
        barrier: ReadinessBarrier,
        to_tally: ChannelWriter,
        from_tally: ChannelReader,
        handle: tokio::task::JoinHandle<Result<TallySummary>>,
        id: StageId,
    }

    fn start(n: usize, parties: u8) -> Harness {
        let router = SignalRouter::new();
        let barrier = ReadinessBarrier::new();
        let (to_tally, inbound) = channel("validator->tally", batch_wire_len(n)).unwrap();
        let (outbound, from_tally) = channel("tally->coordinator", 64).unwrap();
        let stage = TallyStage::new(
            router.register(STAGE),
            inbound,
            outbound,
            barrier.participant(STAGE),
            Arc::new(SharedGate::new()),
            RandomSource::seeded(11).stream(2),
            settings(parties),
        );
        let id = stage.id();
        Harness {
            router,
            barrier,
            to_tally,
            from_tally,
            handle: tokio::spawn(stage.run()),
            id,
        }
    }

    #[tokio::test]
    async fn test_stats_then_one_event_per_valid_voter_in_order() {
        let batch = validated(12);
        let mut h = start(batch.len(), 6);
        h.barrier.await_all(1).await.unwrap();
        h.to_tally.send_batch(&batch).await.unwrap();
        h.router.raise(h.id).unwrap();

        let stats: TallyStats = h.from_tally.recv().await.unwrap();
        assert_eq!(stats, TallyStats { valid: 8, invalid: 4 });

        let expected: Vec<VoterId> = batch.iter().filter(|r| r.is_valid()).map(|r| r.id()).collect();
        let mut seen = Vec::new();
        for _ in 0..stats.valid {
            let event: VoteEvent = h.from_tally.recv().await.unwrap();
            assert!((1..=6).contains(&event.party.get()));
            seen.push(event.voter);
        }
        assert_eq!(seen, expected);

        let summary = h.handle.await.unwrap().unwrap();
        assert_eq!(summary.votes_cast, 8);
        assert_eq!(summary.stats, stats);
    }

    #[tokio::test]
    async fn test_waits_for_data_ready_before_reading() {
        let batch = validated(3);
        let mut h = start(batch.len(), 2);
        h.barrier.await_all(1).await.unwrap();
        h.to_tally.send_batch(&batch).await.unwrap();

        let early = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            h.from_tally.recv::<TallyStats>(),
        )
        .await;
        assert!(early.is_err(), "tally must not count before it is notified");

        h.router.raise(h.id).unwrap();
        let stats: TallyStats = h.from_tally.recv().await.unwrap();
        assert_eq!(stats.total(), 3);
    }

    #[tokio::test]
    async fn test_all_invalid_sends_no_events() {
        let mut batch = validated(4);
        for record in batch.records_mut() {
            record.set_validity(false);
        }
        let mut h = start(batch.len(), 6);
        h.barrier.await_all(1).await.unwrap();
        h.to_tally.send_batch(&batch).await.unwrap();
        h.router.raise(h.id).unwrap();

        let stats: TallyStats = h.from_tally.recv().await.unwrap();
        assert_eq!(stats, TallyStats { valid: 0, invalid: 4 });
        let summary = h.handle.await.unwrap().unwrap();
        assert_eq!(summary.votes_cast, 0);
        // stream ends right after the stats
        let err = h.from_tally.recv::<VoteEvent>().await.unwrap_err();
        assert!(matches!(err, PipelineError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn test_truncated_batch_is_channel_closed() {
        let mut h = start(4, 6);
        h.barrier.await_all(1).await.unwrap();
        h.to_tally
            .send(&crate::wire::BatchLength(4))
            .await
            .unwrap();
        let Harness {
            to_tally,
            router,
            id,
            handle,
            ..
        } = h;
        to_tally.close().await.unwrap();
        router.raise(id).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::ChannelClosed { .. }));
    }
}

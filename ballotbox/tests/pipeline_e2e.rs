//! End-to-end runs of the election pipeline and the contest

use ballotbox::{
    read_report, Contestant, Coordinator, ErrorCategory, FileReportSink, Judge, PipelineError,
    SimulationConfig, TimingConfig,
};
use std::collections::HashSet;
use tempfile::TempDir;

fn instant(voters: i64, seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::for_voters(voters);
    config.seed = Some(seed);
    config.timing = TimingConfig::instant();
    config.election.write_report = false;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_valid_voters_all_vote() {
    let mut config = instant(10, 21);
    config.election.validity_probability = 1.0;
    config.break_probability = 0.0;

    let outcome = Coordinator::new(config).unwrap().run().await.unwrap();
    assert_eq!(outcome.stats.valid, 10);
    assert_eq!(outcome.stats.invalid, 0);
    assert_eq!(outcome.votes.len(), 10);
    assert_eq!(outcome.totals.counts().len(), 6);
    assert_eq!(outcome.totals.total(), 10);
    assert!(outcome.winner.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_votes_match_stats_without_repeats_in_batch_order() {
    for seed in 0..8 {
        let mut config = instant(60, seed);
        config.break_probability = 0.5;

        let outcome = Coordinator::new(config).unwrap().run().await.unwrap();
        assert_eq!(outcome.stats.total(), 60);
        assert_eq!(outcome.votes.len(), outcome.stats.valid as usize);

        let mut seen = HashSet::new();
        let mut last_index = None;
        for vote in &outcome.votes {
            assert!(seen.insert(vote.voter), "voter {} voted twice", vote.voter);
            let index = outcome.batch.position(vote.voter).expect("vote from the batch");
            if let Some(last) = last_index {
                assert!(index > last, "votes must follow batch order");
            }
            last_index = Some(index);
            assert!((1..=6).contains(&vote.party.get()));
        }
        assert!(outcome.peak_gate_occupancy <= 1);
    }
}

#[tokio::test]
async fn test_validity_rate_is_near_eighty_percent() {
    let mut config = instant(2_000, 8);
    config.break_probability = 0.0;
    let outcome = Coordinator::new(config).unwrap().run().await.unwrap();
    assert!(
        (1_500..=1_700).contains(&outcome.stats.valid),
        "valid = {}",
        outcome.stats.valid
    );
}

#[tokio::test]
async fn test_certain_breaks_still_finish() {
    let mut config = instant(20, 2);
    config.break_probability = 1.0;
    let outcome = Coordinator::new(config).unwrap().run().await.unwrap();
    assert_eq!(outcome.stats.total(), 20);
    assert_eq!(outcome.peak_gate_occupancy, 1);
}

#[tokio::test]
async fn test_single_voter_with_tiny_buffers() {
    let mut config = instant(1, 4);
    config.channel_buffer = 1;
    config.election.validity_probability = 1.0;
    let outcome = Coordinator::new(config).unwrap().run().await.unwrap();
    assert_eq!(outcome.votes.len(), 1);
    assert_eq!(outcome.votes[0].voter, outcome.batch.records()[0].id());
}

#[test]
fn test_zero_voters_rejected_before_anything_runs() {
    let err = Coordinator::new(instant(0, 1)).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[tokio::test]
async fn test_report_file_holds_the_stats() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tally.txt");

    let outcome = Coordinator::new(instant(15, 6))?
        .with_report_sink(FileReportSink::new(&path))
        .run()
        .await?;

    assert_eq!(outcome.report_path.as_deref(), Some(path.as_path()));
    assert_eq!(read_report(&path)?, outcome.stats);
    Ok(())
}

#[tokio::test]
async fn test_report_path_from_config() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("configured.txt");
    let mut config = instant(5, 6);
    config.election.write_report = true;
    config.election.report = Some(path.clone());

    let outcome = Coordinator::new(config)?.run().await?;
    assert_eq!(outcome.report_path, Some(path.clone()));
    assert_eq!(read_report(&path)?.total(), 5);
    Ok(())
}

#[tokio::test]
async fn test_default_contest_areas() {
    let mut config = SimulationConfig::default();
    config.seed = Some(12);
    config.timing = TimingConfig::instant();
    let judge = Judge::new(config).unwrap();

    let contestants = vec![
        Contestant::new("Tapsi", "Barátfa").unwrap(),
        Contestant::new("Füles", "Páskom").unwrap(),
        Contestant::new("Nyuszi", "Káposztás kert").unwrap(),
        Contestant::new("Ugri", "Malom telek").unwrap(),
    ];
    let outcome = judge.run(contestants).await.unwrap();

    assert_eq!(outcome.reports.len(), 2);
    assert_eq!(outcome.results().count(), 4);
    assert!(outcome.skipped.is_empty());
    let best = outcome.results().map(|r| r.eggs).max().unwrap();
    assert_eq!(outcome.winner.unwrap().eggs, best);
}

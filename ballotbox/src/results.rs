//! Per-party vote totals and winner selection

use crate::types::PartyId;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// A party with the most votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub party: PartyId,
    pub votes: u32,
}

/// Vote count for each party `1..=P`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyTotals {
    counts: Vec<u32>,
}

impl PartyTotals {
    /// All `parties` parties at zero votes
    pub fn new(parties: u8) -> Self {
        Self {
            counts: vec![0; usize::from(parties)],
        }
    }

    /// Totals where `counts[0]` belongs to party 1
    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Add one vote for `party`
    pub fn record(&mut self, party: PartyId) -> Result<()> {
        let parties = self.counts.len();
        let slot = self.counts.get_mut(party.index()).ok_or_else(|| {
            PipelineError::configuration(format!(
                "Party {} is outside the ballot of {} parties",
                party, parties
            ))
        })?;
        *slot += 1;
        Ok(())
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Iterate `(party, votes)` pairs in ballot order
    pub fn iter(&self) -> impl Iterator<Item = (PartyId, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(i, &votes)| Some((PartyId::new(u8::try_from(i + 1).ok()?)?, votes)))
    }

    /// The lowest-numbered party holding the maximum
    ///
    /// The scan only moves on a strictly greater total, so a later tie never
    /// replaces an earlier leader. An empty ballot has no winner.
    pub fn winner(&self) -> Option<Winner> {
        let mut best: Option<Winner> = None;
        for (party, votes) in self.iter() {
            match best {
                Some(leader) if votes <= leader.votes => {}
                _ => best = Some(Winner { party, votes }),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(raw: u8) -> PartyId {
        PartyId::new(raw).unwrap()
    }

    #[test]
    fn test_first_maximum_wins_ties() {
        let totals = PartyTotals::from_counts(vec![3, 5, 5, 2, 0, 1]);
        assert_eq!(
            totals.winner(),
            Some(Winner {
                party: party(2),
                votes: 5
            })
        );
    }

    #[test]
    fn test_all_zero_picks_party_one() {
        let totals = PartyTotals::new(6);
        assert_eq!(totals.winner().unwrap().party, party(1));
        assert_eq!(totals.winner().unwrap().votes, 0);
    }

    #[test]
    fn test_empty_ballot_has_no_winner() {
        assert_eq!(PartyTotals::new(0).winner(), None);
    }

    #[test]
    fn test_record_counts_and_rejects_unknown_party() {
        let mut totals = PartyTotals::new(3);
        totals.record(party(3)).unwrap();
        totals.record(party(3)).unwrap();
        totals.record(party(1)).unwrap();
        assert_eq!(totals.counts(), &[1, 0, 2]);
        assert_eq!(totals.total(), 3);
        assert_eq!(totals.winner().unwrap().party, party(3));

        assert!(totals.record(party(4)).is_err());
        assert_eq!(totals.total(), 3);
    }
}

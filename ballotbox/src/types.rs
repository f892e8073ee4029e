//! Records handed between the election stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a voter, unique within one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoterId(u32);

impl VoterId {
    /// Create a voter id, rejecting zero
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Raw numeric value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Party number in `1..=P`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(u8);

impl PartyId {
    /// Create a party id, rejecting zero
    pub fn new(raw: u8) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Raw numeric value
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based slot for per-party arrays
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a stage for directed notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub u32);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One voter as it moves through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    id: VoterId,
    validity: Option<bool>,
    party: Option<PartyId>,
}

impl VoterRecord {
    /// Fresh record: validity unset, no party
    pub fn new(id: VoterId) -> Self {
        Self {
            id,
            validity: None,
            party: None,
        }
    }

    /// Rebuild a record from decoded parts, enforcing the party invariant
    pub fn from_parts(
        id: VoterId,
        validity: Option<bool>,
        party: Option<PartyId>,
    ) -> std::result::Result<Self, &'static str> {
        if party.is_some() && validity != Some(true) {
            return Err("party assigned to a voter that is not valid");
        }
        Ok(Self {
            id,
            validity,
            party,
        })
    }

    pub fn id(&self) -> VoterId {
        self.id
    }

    pub fn validity(&self) -> Option<bool> {
        self.validity
    }

    pub fn party(&self) -> Option<PartyId> {
        self.party
    }

    /// True only when validation marked the voter valid
    pub fn is_valid(&self) -> bool {
        self.validity == Some(true)
    }

    /// Record the validation outcome; clears a party if the voter becomes invalid
    pub fn set_validity(&mut self, valid: bool) {
        self.validity = Some(valid);
        if !valid {
            self.party = None;
        }
    }

    /// Assign the party this voter cast for
    pub fn assign_party(&mut self, party: PartyId) -> std::result::Result<(), &'static str> {
        if !self.is_valid() {
            return Err("only a valid voter can cast a vote");
        }
        self.party = Some(party);
        Ok(())
    }
}

/// Ordered batch of voters; each stage owns its own copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterBatch {
    records: Vec<VoterRecord>,
}

impl VoterBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<VoterRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[VoterRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [VoterRecord] {
        &mut self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoterRecord> {
        self.records.iter()
    }

    /// Position of a voter in the batch
    pub fn position(&self, id: VoterId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

/// Valid and invalid counts of a validated batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyStats {
    pub valid: u32,
    pub invalid: u32,
}

impl TallyStats {
    /// Count the records marked valid; everything else is invalid
    pub fn tabulate(batch: &VoterBatch) -> Self {
        let valid = batch.iter().filter(|r| r.is_valid()).count() as u32;
        Self {
            valid,
            invalid: batch.len() as u32 - valid,
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.valid) + u64::from(self.invalid)
    }
}

/// A single cast vote, streamed from the tally to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub voter: VoterId,
    pub party: PartyId,
}

//! Fixed-size wire encodings
//!
//! Every message is a record whose size is known statically, so no delimiters
//! are needed. Integers are big-endian. A batch is a `u32` length followed by
//! that many [`VoterRecord`]s.

use crate::types::{PartyId, StageId, TallyStats, VoteEvent, VoterBatch, VoterId, VoterRecord};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Capacity of a fixed text field, including the terminating zero
pub const TEXT_FIELD_LEN: usize = 128;

const VALIDITY_UNSET: u8 = 0;
const VALIDITY_VALID: u8 = 1;
const VALIDITY_INVALID: u8 = 2;

/// Reasons a record cannot be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("voter id must be positive")]
    ZeroVoterId,

    #[error("party must be positive")]
    ZeroParty,

    #[error("unknown validity flag {0}")]
    UnknownValidity(u8),

    #[error("{0}")]
    Invariant(&'static str),

    #[error("text field is not valid UTF-8")]
    InvalidText,
}

/// A message with a statically known encoded size
pub trait WireRecord: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Append exactly `SIZE` bytes to `buf`
    fn encode(&self, buf: &mut BytesMut);

    /// Decode from exactly `SIZE` bytes
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError>;
}

/// Length prefix of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLength(pub u32);

impl WireRecord for BatchLength {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(BatchLength(buf.get_u32()))
    }
}

impl WireRecord for StageId {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(StageId(buf.get_u32()))
    }
}

impl WireRecord for VoterRecord {
    const SIZE: usize = 6;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.id().get());
        buf.put_u8(match self.validity() {
            None => VALIDITY_UNSET,
            Some(true) => VALIDITY_VALID,
            Some(false) => VALIDITY_INVALID,
        });
        buf.put_u8(self.party().map_or(0, |p| p.get()));
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let id = VoterId::new(buf.get_u32()).ok_or(DecodeError::ZeroVoterId)?;
        let validity = match buf.get_u8() {
            VALIDITY_UNSET => None,
            VALIDITY_VALID => Some(true),
            VALIDITY_INVALID => Some(false),
            other => return Err(DecodeError::UnknownValidity(other)),
        };
        let party = PartyId::new(buf.get_u8());
        VoterRecord::from_parts(id, validity, party).map_err(DecodeError::Invariant)
    }
}

impl WireRecord for TallyStats {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.valid);
        buf.put_u32(self.invalid);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        Ok(TallyStats {
            valid: buf.get_u32(),
            invalid: buf.get_u32(),
        })
    }
}

impl WireRecord for VoteEvent {
    const SIZE: usize = 5;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.voter.get());
        buf.put_u8(self.party.get());
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let voter = VoterId::new(buf.get_u32()).ok_or(DecodeError::ZeroVoterId)?;
        let party = PartyId::new(buf.get_u8()).ok_or(DecodeError::ZeroParty)?;
        Ok(VoteEvent { voter, party })
    }
}

/// Encoded size of a batch of `len` records, including the length prefix
pub fn batch_wire_len(len: usize) -> usize {
    BatchLength::SIZE + len * VoterRecord::SIZE
}

/// Append a whole batch (length prefix and records)
pub fn encode_batch(batch: &VoterBatch, buf: &mut BytesMut) {
    buf.reserve(batch_wire_len(batch.len()));
    BatchLength(batch.len() as u32).encode(buf);
    for record in batch.iter() {
        record.encode(buf);
    }
}

/// Write `text` into a zero-padded fixed field; the caller checks the length
pub(crate) fn put_text(buf: &mut BytesMut, text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(TEXT_FIELD_LEN - 1);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, TEXT_FIELD_LEN - len);
}

/// Read a zero-padded fixed field
pub(crate) fn get_text<B: Buf>(buf: &mut B) -> Result<String, DecodeError> {
    let mut field = [0u8; TEXT_FIELD_LEN];
    buf.copy_to_slice(&mut field);
    let end = field.iter().position(|b| *b == 0).unwrap_or(TEXT_FIELD_LEN);
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidText)
}

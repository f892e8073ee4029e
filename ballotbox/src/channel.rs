//! Ordered, blocking, single-producer/single-consumer channels
//!
//! A channel is an in-memory byte pipe with a small buffer: a write returns
//! only once the bytes fit, so a fast producer waits for its consumer. Records
//! are encoded with [`WireRecord`] and read back with exact-length reads, so a
//! peer that goes away mid-message surfaces as
//! [`PipelineError::ChannelClosed`].

use crate::types::{VoterBatch, VoterRecord};
use crate::wire::{encode_batch, BatchLength, WireRecord};
use crate::{PipelineError, Result};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::trace;

/// Create a channel named `name` whose pipe buffers at most `capacity` bytes
pub fn channel(name: impl Into<String>, capacity: usize) -> Result<(ChannelWriter, ChannelReader)> {
    let name: Arc<str> = Arc::from(name.into());
    if capacity == 0 {
        return Err(PipelineError::ResourceSetup {
            resource: "channel",
            message: format!("channel '{}' needs a buffer of at least one byte", name),
        });
    }
    let (write_end, read_end) = tokio::io::duplex(capacity);
    Ok((
        ChannelWriter {
            name: name.clone(),
            stream: write_end,
        },
        ChannelReader {
            name,
            stream: read_end,
        },
    ))
}

/// Producing end of a channel
#[derive(Debug)]
pub struct ChannelWriter {
    name: Arc<str>,
    stream: DuplexStream,
}

impl ChannelWriter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one record, waiting until the consumer has room for it
    pub async fn send<R: WireRecord>(&mut self, record: &R) -> Result<()> {
        let mut buf = BytesMut::with_capacity(R::SIZE);
        record.encode(&mut buf);
        self.write(&buf).await
    }

    /// Send a length-prefixed batch
    pub async fn send_batch(&mut self, batch: &VoterBatch) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_batch(batch, &mut buf);
        trace!(channel = %self.name, records = batch.len(), "sending batch");
        self.write(&buf).await
    }

    /// Flush and close; the reader sees end of stream after the buffered bytes
    pub async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|source| PipelineError::ChannelClosed {
                channel: self.name.to_string(),
                source,
            })
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let result = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        }
        .await;
        result.map_err(|source| PipelineError::ChannelClosed {
            channel: self.name.to_string(),
            source,
        })
    }
}

/// Consuming end of a channel
#[derive(Debug)]
pub struct ChannelReader {
    name: Arc<str>,
    stream: DuplexStream,
}

impl ChannelReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive one record, waiting until all of its bytes have arrived
    pub async fn recv<R: WireRecord>(&mut self) -> Result<R> {
        let mut buf = vec![0u8; R::SIZE];
        self.read_exact(&mut buf).await?;
        R::decode(&mut &buf[..]).map_err(|e| PipelineError::malformed(&*self.name, e.to_string()))
    }

    /// Receive a length-prefixed batch of at most `max_len` records
    ///
    /// The record buffer is reserved up front; failing to reserve it is a
    /// [`PipelineError::ResourceExhaustion`].
    pub async fn recv_batch(&mut self, max_len: usize) -> Result<VoterBatch> {
        let BatchLength(len) = self.recv().await?;
        let len = len as usize;
        if len > max_len {
            return Err(PipelineError::malformed(
                &*self.name,
                format!("batch length {} exceeds the limit of {}", len, max_len),
            ));
        }

        let mut records: Vec<VoterRecord> = Vec::new();
        records
            .try_reserve_exact(len)
            .map_err(|source| PipelineError::ResourceExhaustion {
                what: "voter batch",
                requested: len,
                source,
            })?;
        for _ in 0..len {
            records.push(self.recv().await?);
        }
        trace!(channel = %self.name, records = len, "received batch");
        Ok(VoterBatch::from_records(records))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream
            .read_exact(buf)
            .await
            .map(|_| ())
            .map_err(|source| PipelineError::ChannelClosed {
                channel: self.name.to_string(),
                source,
            })
    }
}

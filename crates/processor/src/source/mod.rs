//! Message sources
//!
//! A [`MessageSource`] yields raw payloads together with their partition and
//! offset. The executor polls a single source with a bounded timeout, seeks
//! it to the checkpointed resume offsets at startup and retries
//! [`SourceError::Unavailable`](crate::error::SourceError::Unavailable)
//! failures with an exponential [`Backoff`].
//!
//! - [`MemorySource`]: in-memory log for tests and embedding
//! - [`FileSource`]: newline-delimited JSON file
//! - `KafkaSource`: Kafka topic, behind the `kafka` feature

pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

pub use file::FileSource;
#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;
pub use memory::{MemoryLogHandle, MemorySource};

use crate::error::SourceResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A raw message read from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Per-partition offsets
///
/// Used both for resume positions (next offset to read) and for high
/// offsets at checkpoint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceOffsets(BTreeMap<i32, i64>);

impl SourceOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: i32) -> Option<i64> {
        self.0.get(&partition).copied()
    }

    pub fn set(&mut self, partition: i32, offset: i64) {
        self.0.insert(partition, offset);
    }

    /// Raise the offset of `partition` to at least `offset`
    pub fn advance(&mut self, partition: i32, offset: i64) {
        let entry = self.0.entry(partition).or_insert(offset);
        *entry = (*entry).max(offset);
    }

    /// Lower the offset of `partition` to at most `offset`
    pub fn lower(&mut self, partition: i32, offset: i64) {
        let entry = self.0.entry(partition).or_insert(offset);
        *entry = (*entry).min(offset);
    }

    /// Per partition minimum of both sides; partitions known to only one
    /// side keep that side's offset
    pub fn merge_min(&mut self, other: &SourceOffsets) {
        for (partition, offset) in other.iter() {
            self.lower(partition, offset);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i64)> + '_ {
        self.0.iter().map(|(partition, offset)| (*partition, *offset))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(i32, i64)> for SourceOffsets {
    fn from_iter<I: IntoIterator<Item = (i32, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for SourceOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (partition, offset)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", partition, offset)?;
        }
        f.write_str("}")
    }
}

/// A partitioned, replayable log of raw payloads
#[async_trait]
pub trait MessageSource: Send {
    /// Identifier used in logs and errors
    fn id(&self) -> &str;

    /// Wait at most `timeout` for the next message
    ///
    /// `Ok(None)` means nothing arrived in time, or the source is exhausted.
    async fn poll(&mut self, timeout: Duration) -> SourceResult<Option<SourceMessage>>;

    /// Position the source so that the next message of each listed partition
    /// has an offset of at least the given one
    async fn seek(&mut self, offsets: &SourceOffsets) -> SourceResult<()>;

    /// Whether a bounded source has delivered everything it holds
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[async_trait]
impl MessageSource for Box<dyn MessageSource> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn poll(&mut self, timeout: Duration) -> SourceResult<Option<SourceMessage>> {
        (**self).poll(timeout).await
    }

    async fn seek(&mut self, offsets: &SourceOffsets) -> SourceResult<()> {
        (**self).seek(offsets).await
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Exponential retry delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

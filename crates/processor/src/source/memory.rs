//! In-memory message log
//!
//! The log is shared between the source and any number of
//! [`MemoryLogHandle`]s, so a test can keep appending while the executor
//! runs and close the log to make the source exhaustible.

use super::{MessageSource, SourceMessage, SourceOffsets};
use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct MemoryLog {
    messages: Vec<SourceMessage>,
    next_offsets: SourceOffsets,
    closed: bool,
    failures_pending: u32,
}

/// Producer side of a [`MemorySource`]
#[derive(Debug, Clone)]
pub struct MemoryLogHandle {
    log: Arc<Mutex<MemoryLog>>,
    notify: Arc<Notify>,
}

impl MemoryLogHandle {
    /// Append a payload to `partition`, returning its offset
    pub fn push(&self, partition: i32, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut log = self.log.lock();
            let offset = log.next_offsets.get(partition).unwrap_or(0);
            log.next_offsets.set(partition, offset + 1);
            log.messages.push(SourceMessage {
                partition,
                offset,
                payload: payload.into(),
            });
            offset
        };
        self.notify.notify_waiters();
        offset
    }

    /// No further messages will be appended
    pub fn close(&self) {
        self.log.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Make the next `count` polls fail as unavailable
    pub fn fail_next_polls(&self, count: u32) {
        self.log.lock().failures_pending = count;
    }

    pub fn len(&self) -> usize {
        self.log.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source reading from an in-memory log
#[derive(Debug)]
pub struct MemorySource {
    id: String,
    handle: MemoryLogHandle,
    cursor: usize,
    positions: SourceOffsets,
}

impl MemorySource {
    /// Empty, open log
    pub fn new() -> Self {
        Self {
            id: "memory".to_string(),
            handle: MemoryLogHandle {
                log: Arc::new(Mutex::new(MemoryLog::default())),
                notify: Arc::new(Notify::new()),
            },
            cursor: 0,
            positions: SourceOffsets::new(),
        }
    }

    /// Closed log holding `payloads` on partition 0
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let source = Self::new();
        for payload in payloads {
            source.handle.push(0, payload);
        }
        source.handle.close();
        source
    }

    pub fn handle(&self) -> MemoryLogHandle {
        self.handle.clone()
    }

    fn next_message(&mut self) -> SourceResult<Option<SourceMessage>> {
        let mut log = self.handle.log.lock();
        if log.failures_pending > 0 {
            log.failures_pending -= 1;
            return Err(SourceError::Unavailable {
                source_id: self.id.clone(),
                reason: "injected failure".to_string(),
            });
        }

        while self.cursor < log.messages.len() {
            let message = &log.messages[self.cursor];
            self.cursor += 1;
            let position = self.positions.get(message.partition).unwrap_or(0);
            if message.offset >= position {
                return Ok(Some(message.clone()));
            }
        }
        Ok(None)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn poll(&mut self, timeout: Duration) -> SourceResult<Option<SourceMessage>> {
        let notify = self.handle.notify.clone();
        let notified = notify.notified();
        if let Some(message) = self.next_message()? {
            return Ok(Some(message));
        }
        if self.is_exhausted() {
            return Ok(None);
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        self.next_message()
    }

    async fn seek(&mut self, offsets: &SourceOffsets) -> SourceResult<()> {
        self.cursor = 0;
        self.positions = offsets.clone();
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        let log = self.handle.log.lock();
        log.closed && self.cursor >= log.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_memory_source_reads_in_order() {
        let mut source = MemorySource::from_payloads(["a", "b"]);

        let first = source.poll(TIMEOUT).await.unwrap().unwrap();
        let second = source.poll(TIMEOUT).await.unwrap().unwrap();
        assert_eq!((first.offset, first.payload), (0, b"a".to_vec()));
        assert_eq!((second.offset, second.payload), (1, b"b".to_vec()));

        assert!(source.is_exhausted());
        assert_eq!(source.poll(TIMEOUT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_source_seek_skips_per_partition() {
        let mut source = MemorySource::new();
        let handle = source.handle();
        handle.push(0, "p0-0");
        handle.push(1, "p1-0");
        handle.push(0, "p0-1");
        handle.push(1, "p1-1");
        handle.close();

        source
            .seek(&[(0, 1)].into_iter().collect())
            .await
            .unwrap();

        let mut read = Vec::new();
        while let Some(message) = source.poll(TIMEOUT).await.unwrap() {
            read.push(String::from_utf8(message.payload).unwrap());
        }
        assert_eq!(read, vec!["p1-0", "p0-1", "p1-1"]);
    }

    #[tokio::test]
    async fn test_open_log_waits_then_returns_none() {
        let mut source = MemorySource::new();
        assert_eq!(source.poll(TIMEOUT).await.unwrap(), None);
        assert!(!source.is_exhausted());

        source.handle().push(0, "late");
        assert!(source.poll(TIMEOUT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut source = MemorySource::from_payloads(["a"]);
        source.handle().fail_next_polls(1);

        assert!(matches!(
            source.poll(TIMEOUT).await,
            Err(SourceError::Unavailable { .. })
        ));
        assert!(source.poll(TIMEOUT).await.unwrap().is_some());
    }
}

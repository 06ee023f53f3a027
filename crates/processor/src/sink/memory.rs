//! In-memory sink
//!
//! Keeps every successfully written batch. Clones share the same storage so
//! a test can hand one clone to a pipeline and inspect the other.

use super::{OutputRow, SinkWriter};
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Shared<R> {
    batches: Mutex<Vec<(u64, Vec<R>)>>,
    fail_writes: AtomicBool,
    attempts: AtomicU64,
}

/// Sink collecting batches in memory
#[derive(Debug, Clone)]
pub struct MemorySink<R> {
    name: String,
    shared: Arc<Shared<R>>,
}

impl<R: OutputRow> MemorySink<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                batches: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Make following writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful batches in write order
    pub fn batches(&self) -> Vec<(u64, Vec<R>)> {
        self.shared.batches.lock().clone()
    }

    /// All rows of all successful batches
    pub fn rows(&self) -> Vec<R> {
        self.shared
            .batches
            .lock()
            .iter()
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    /// Write calls, failed ones included
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: OutputRow> SinkWriter<R> for MemorySink<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, batch_id: u64, rows: &[R]) -> SinkResult<()> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::WriteFailed {
                sink: self.name.clone(),
                batch_id,
                reason: "write failure injected".to_string(),
            });
        }

        let mut batches = self.shared.batches.lock();
        match batches.iter_mut().find(|(id, _)| *id == batch_id) {
            Some((_, existing)) => *existing = rows.to_vec(),
            None => batches.push((batch_id, rows.to_vec())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sales_kpi_types::AggregateRecord;

    fn record(minute: u32) -> AggregateRecord {
        AggregateRecord {
            start: Utc.with_ymd_and_hms(2020, 11, 20, 5, minute, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 11, 20, 5, minute + 1, 0).unwrap(),
            group: None,
            metrics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_collects_and_fails_on_demand() {
        let sink = MemorySink::new("memory");
        let observer = sink.clone();

        sink.write(0, &[record(1)]).await.unwrap();
        sink.set_fail_writes(true);
        assert!(sink.write(1, &[record(2)]).await.is_err());
        sink.set_fail_writes(false);
        sink.write(1, &[record(2), record(3)]).await.unwrap();

        assert_eq!(observer.attempts(), 3);
        assert_eq!(observer.batches().len(), 2);
        assert_eq!(observer.rows(), vec![record(1), record(2), record(3)]);
    }

    #[tokio::test]
    async fn test_same_batch_id_replaces_rows() {
        let sink = MemorySink::new("memory");
        sink.write(5, &[record(1)]).await.unwrap();
        sink.write(5, &[record(1), record(2)]).await.unwrap();

        assert_eq!(sink.batches(), vec![(5, vec![record(1), record(2)])]);
    }
}

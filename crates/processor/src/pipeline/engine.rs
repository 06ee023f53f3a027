//! Window aggregation engine
//!
//! One engine runs per aggregation spec. It assigns each event to its
//! tumbling window and group, drops events whose window the watermark has
//! already closed, and hands out sealed records in batches.
//!
//! Sealing is split in two so that a batch can be written and checkpointed
//! before its state is released:
//!
//! 1. [`prepare_seal`](WindowAggregationEngine::prepare_seal) finalizes every
//!    sealable key without removing it.
//! 2. [`complete_seal`](WindowAggregationEngine::complete_seal) removes them
//!    once the batch is durable.
//!
//! If step 2 never happens, the next `prepare_seal` yields the same records
//! again, plus any that became sealable since.

use crate::config::AggregationSpec;
use crate::core::{GroupBy, IngestedEvent};
use crate::error::Result;
use crate::source::SourceOffsets;
use crate::state::{AggregateKey, AggregateStore, Checkpoint, MergeOutcome};
use crate::watermark::{Watermark, WatermarkTracker};
use crate::window::TumblingWindowAssigner;

use sales_kpi_types::AggregateRecord;
use std::collections::HashSet;
use tracing::{debug, trace};

/// What happened to an ingested event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Folded into its window aggregate
    Merged,
    /// Its window was already closed; the event is discarded
    LateDropped,
    /// Below the checkpointed resume offset; already accounted for
    Replayed,
    /// Replay of an event whose window was emitted before the restart
    AlreadyEmitted,
}

/// Counters kept by an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub merged: u64,
    pub late_dropped: u64,
    pub replayed: u64,
    pub already_emitted: u64,
    pub records_sealed: u64,
}

/// Records ready to be written, with the checkpoint state they imply
#[derive(Debug, Clone)]
pub struct SealBatch {
    keys: Vec<AggregateKey>,
    /// Records in window-start order, ties by group
    pub records: Vec<AggregateRecord>,
    /// Watermark the batch was sealed under
    pub watermark: Watermark,
    /// Resume offsets once these keys are gone
    pub resume_offsets: SourceOffsets,
    /// Next unread offset per partition at seal time
    pub source_high: SourceOffsets,
    /// Largest window end emitted so far, this batch included
    pub last_window_end: Option<i64>,
}

impl SealBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Event-time windowed aggregation for one spec
#[derive(Debug)]
pub struct WindowAggregationEngine {
    pipeline_id: String,
    group_by: GroupBy,
    assigner: TumblingWindowAssigner,
    watermark: WatermarkTracker,
    store: AggregateStore,
    /// Events below these offsets were covered by the restored checkpoint
    resume: SourceOffsets,
    /// Next unread offset per partition as of the restored checkpoint
    restored_high: SourceOffsets,
    /// Next unread offset per partition
    high: SourceOffsets,
    last_window_end: Option<i64>,
    stats: EngineStats,
}

impl WindowAggregationEngine {
    pub fn new(spec: &AggregationSpec) -> Result<Self> {
        Ok(Self {
            pipeline_id: spec.id.clone(),
            group_by: spec.group_by,
            assigner: TumblingWindowAssigner::from_millis(spec.window_size_ms)?,
            watermark: WatermarkTracker::new(spec.allowed_lateness()),
            store: AggregateStore::new(spec.metrics.clone(), spec.group_by),
            resume: SourceOffsets::new(),
            restored_high: SourceOffsets::new(),
            high: SourceOffsets::new(),
            last_window_end: None,
            stats: EngineStats::default(),
        })
    }

    /// Resume from a checkpoint
    ///
    /// Must be called before the first event is ingested.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.resume = checkpoint.source_offsets.clone();
        self.high = checkpoint.source_offsets.clone();
        self.restored_high = checkpoint.source_high.clone();
        self.last_window_end = checkpoint.last_window_end;
        self.watermark.restore_floor(checkpoint.sealed_through);

        debug!(
            pipeline = %self.pipeline_id,
            resume = %self.resume,
            watermark = %self.watermark.current(),
            "Engine restored"
        );
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// First offset per partition this engine needs from the source
    pub fn resume_offsets(&self) -> &SourceOffsets {
        &self.resume
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark.current()
    }

    pub fn open_windows(&self) -> usize {
        self.store.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    fn closed_outcome(&mut self, event: &IngestedEvent) -> IngestOutcome {
        let replay = self
            .restored_high
            .get(event.partition)
            .map_or(false, |high| event.offset < high);
        if replay {
            self.stats.already_emitted += 1;
            IngestOutcome::AlreadyEmitted
        } else {
            self.stats.late_dropped += 1;
            IngestOutcome::LateDropped
        }
    }

    /// Route one event into its window aggregate
    pub fn ingest(&mut self, event: &IngestedEvent) -> Result<IngestOutcome> {
        if self
            .resume
            .get(event.partition)
            .map_or(false, |resume| event.offset < resume)
        {
            self.stats.replayed += 1;
            return Ok(IngestOutcome::Replayed);
        }
        self.high.advance(event.partition, event.offset.saturating_add(1));

        let timestamp = event.event.timestamp();
        let window = self.assigner.assign(timestamp)?;

        if self.watermark.is_closed(&window) {
            let outcome = self.closed_outcome(event);
            trace!(
                pipeline = %self.pipeline_id,
                window = %window,
                watermark = %self.watermark.current(),
                offset = event.offset,
                "Dropped event for closed window"
            );
            return Ok(outcome);
        }

        let key = AggregateKey::new(
            window.bounds.start_millis(),
            self.group_by.extract(&event.event),
        );
        let outcome = match self.store.merge(key, &window, event, &self.watermark)? {
            MergeOutcome::Created | MergeOutcome::Updated => {
                self.stats.merged += 1;
                IngestOutcome::Merged
            }
            MergeOutcome::Closed => self.closed_outcome(event),
        };

        if let Some(watermark) = self.watermark.observe(timestamp.timestamp_millis()) {
            trace!(pipeline = %self.pipeline_id, watermark = %watermark, "Watermark advanced");
        }
        Ok(outcome)
    }

    /// Finalize every key whose window is closed, without removing any
    pub fn prepare_seal(&self) -> Result<SealBatch> {
        let watermark = self.watermark.current();
        let keys = self.store.list_sealable(watermark);

        let mut records = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(record) = self.store.seal(key)? {
                records.push(record);
            }
        }

        let excluding: HashSet<AggregateKey> = keys.iter().cloned().collect();
        let batch_end = records.iter().map(|record| record.end.timestamp_millis()).max();
        let last_window_end = match (self.last_window_end, batch_end) {
            (Some(previous), Some(end)) => Some(previous.max(end)),
            (previous, end) => previous.or(end),
        };

        Ok(SealBatch {
            resume_offsets: self.store.resume_offsets(&excluding, &self.high),
            source_high: self.high.clone(),
            keys,
            records,
            watermark,
            last_window_end,
        })
    }

    /// Release the state of a batch that is now durable
    pub fn complete_seal(&mut self, batch: &SealBatch) {
        for key in &batch.keys {
            self.store.remove(key);
        }
        self.stats.records_sealed += batch.records.len() as u64;
        self.last_window_end = batch.last_window_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Metric;
    use crate::config::SinkConfig;
    use chrono::{TimeZone, Utc};
    use sales_kpi_types::{EnrichedEvent, EventType, LineItem, MetricValue, SalesEvent};

    fn spec() -> AggregationSpec {
        AggregationSpec::new(
            "kpi",
            vec![Metric::TotalVolumeOfSales, Metric::OrdersPerMinute],
            SinkConfig::Console { truncate: false },
        )
    }

    fn event(offset: i64, seconds: i64, cost: f64) -> IngestedEvent {
        IngestedEvent::new(
            0,
            offset,
            EnrichedEvent::enrich(SalesEvent {
                invoice_no: offset,
                country: "Germany".to_string(),
                timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
                event_type: EventType::Order,
                items: vec![LineItem {
                    sku: "POST".to_string(),
                    title: "POSTAGE".to_string(),
                    unit_price: cost,
                    quantity: 1,
                }],
            }),
        )
    }

    #[test]
    fn test_nothing_sealable_before_watermark_passes_end() {
        let mut engine = WindowAggregationEngine::new(&spec()).unwrap();
        engine.ingest(&event(0, 10, 5.0)).unwrap();
        engine.ingest(&event(1, 119, 5.0)).unwrap();

        // watermark = 119s - 60s, window [0, 60s) still open
        assert!(engine.prepare_seal().unwrap().is_empty());

        engine.ingest(&event(2, 120, 5.0)).unwrap();
        let batch = engine.prepare_seal().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].metric("OPM"), Some(MetricValue::Integer(1)));
    }

    #[test]
    fn test_prepare_is_repeatable_until_completed() {
        let mut engine = WindowAggregationEngine::new(&spec()).unwrap();
        engine.ingest(&event(0, 10, 5.0)).unwrap();
        engine.ingest(&event(1, 130, 1.0)).unwrap();

        let first = engine.prepare_seal().unwrap();
        let second = engine.prepare_seal().unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.resume_offsets, [(0, 1)].into_iter().collect());
        assert_eq!(first.source_high, [(0, 2)].into_iter().collect());

        engine.complete_seal(&first);
        assert!(engine.prepare_seal().unwrap().is_empty());
        assert_eq!(engine.stats().records_sealed, 1);
        assert_eq!(engine.open_windows(), 1);
    }

    #[test]
    fn test_late_event_is_dropped() {
        let mut engine = WindowAggregationEngine::new(&spec()).unwrap();
        engine.ingest(&event(0, 150, 1.0)).unwrap();

        assert_eq!(
            engine.ingest(&event(1, 5, 1.0)).unwrap(),
            IngestOutcome::LateDropped
        );
        assert_eq!(engine.stats().late_dropped, 1);
        assert_eq!(engine.open_windows(), 1);
    }

    #[test]
    fn test_restore_classifies_replay() {
        let mut engine = WindowAggregationEngine::new(&spec()).unwrap();
        engine.restore(&Checkpoint::new(
            "kpi",
            3,
            [(0, 5)].into_iter().collect(),
            [(0, 8)].into_iter().collect(),
            Watermark::new(60_000),
            Some(60_000),
        ));

        assert_eq!(engine.ingest(&event(4, 70, 1.0)).unwrap(), IngestOutcome::Replayed);
        assert_eq!(
            engine.ingest(&event(5, 30, 1.0)).unwrap(),
            IngestOutcome::AlreadyEmitted
        );
        assert_eq!(engine.ingest(&event(6, 70, 1.0)).unwrap(), IngestOutcome::Merged);
        assert_eq!(
            engine.ingest(&event(9, 40, 1.0)).unwrap(),
            IngestOutcome::LateDropped
        );
        assert_eq!(engine.watermark(), Watermark::new(60_000));
    }
}

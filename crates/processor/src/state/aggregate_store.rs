//! Keyed store of open window aggregates
//!
//! Uses DashMap so distinct keys never contend beyond their shard. Every
//! operation on a key runs inside that key's entry lock, which is what makes
//! the late-event check and the merge a single atomic step with respect to
//! sealing.
//!
//! Each entry moves through a small state machine:
//!
//! ```text
//! Open --seal--> Sealing --remove--> (gone)
//! ```
//!
//! A `Sealing` entry has produced its record but the record has not yet been
//! written and checkpointed. Sealing again reproduces the identical record;
//! merging into it is refused.

use crate::aggregation::{Metric, PartialAggregate};
use crate::core::{GroupBy, IngestedEvent};
use crate::error::AggregationResult;
use crate::source::SourceOffsets;
use crate::watermark::{Watermark, WatermarkTracker};
use crate::window::Window;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sales_kpi_types::AggregateRecord;
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

/// Identity of one partial aggregate: window start plus optional group
///
/// Orders by window start, then group with time-only keys first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    pub window_start_ms: i64,
    pub group: Option<String>,
}

impl AggregateKey {
    pub fn new(window_start_ms: i64, group: Option<String>) -> Self {
        Self {
            window_start_ms,
            group,
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}", self.window_start_ms, group),
            None => write!(f, "{}", self.window_start_ms),
        }
    }
}

/// Lifecycle of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Open,
    Sealing,
}

/// Result of a merge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First event of a new aggregate
    Created,
    /// Folded into an existing aggregate
    Updated,
    /// The window is closed or already being sealed; nothing changed
    Closed,
}

#[derive(Debug, Clone)]
struct AggregateEntry {
    window: Window,
    partial: PartialAggregate,
    state: EntryState,
    /// Smallest offset per partition among merged events
    min_offsets: SourceOffsets,
}

/// Concurrent map from [`AggregateKey`] to partial aggregates
#[derive(Debug)]
pub struct AggregateStore {
    entries: DashMap<AggregateKey, AggregateEntry>,
    metrics: Vec<Metric>,
    group_by: GroupBy,
}

impl AggregateStore {
    pub fn new(metrics: Vec<Metric>, group_by: GroupBy) -> Self {
        Self {
            entries: DashMap::new(),
            metrics,
            group_by,
        }
    }

    /// Fold an event into the aggregate for `key`
    ///
    /// The watermark is read inside the key's exclusive section; a window
    /// that is closed at that point is never created or mutated.
    pub fn merge(
        &self,
        key: AggregateKey,
        window: &Window,
        event: &IngestedEvent,
        watermark: &WatermarkTracker,
    ) -> AggregationResult<MergeOutcome> {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.state == EntryState::Sealing || watermark.is_closed(&entry.window) {
                    return Ok(MergeOutcome::Closed);
                }
                entry.partial.update(&event.event)?;
                entry.min_offsets.lower(event.partition, event.offset);
                Ok(MergeOutcome::Updated)
            }
            Entry::Vacant(vacant) => {
                if watermark.is_closed(window) {
                    return Ok(MergeOutcome::Closed);
                }
                let mut partial = PartialAggregate::new(&self.metrics);
                partial.update(&event.event)?;
                let mut min_offsets = SourceOffsets::new();
                min_offsets.set(event.partition, event.offset);

                trace!(key = %vacant.key(), window = %window, "Opened aggregate");
                vacant.insert(AggregateEntry {
                    window: *window,
                    partial,
                    state: EntryState::Open,
                    min_offsets,
                });
                Ok(MergeOutcome::Created)
            }
        }
    }

    /// Keys whose window is closed under `watermark`, in output order
    pub fn list_sealable(&self, watermark: Watermark) -> Vec<AggregateKey> {
        let mut keys: Vec<AggregateKey> = self
            .entries
            .iter()
            .filter(|entry| watermark.closes(entry.value().window.bounds.end_millis()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Finalize `key` and mark it as sealing
    ///
    /// Does not remove the entry. Returns `None` for unknown keys.
    pub fn seal(&self, key: &AggregateKey) -> AggregationResult<Option<AggregateRecord>> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        let group = self.group_by.group_value(key.group.as_deref());
        let record = entry.partial.finalize(&entry.window.bounds, group)?;
        entry.state = EntryState::Sealing;
        Ok(Some(record))
    }

    /// Drop `key` for good
    pub fn remove(&self, key: &AggregateKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Seal and immediately remove `key`
    pub fn seal_and_remove(&self, key: &AggregateKey) -> AggregationResult<Option<AggregateRecord>> {
        let record = self.seal(key)?;
        if record.is_some() {
            self.remove(key);
        }
        Ok(record)
    }

    /// Where a restart must resume reading so that no held event is lost
    ///
    /// Per partition, the smallest offset of any event held by a key outside
    /// `excluding`, capped by `fallback` (the next offset to read).
    pub fn resume_offsets(
        &self,
        excluding: &HashSet<AggregateKey>,
        fallback: &SourceOffsets,
    ) -> SourceOffsets {
        let mut offsets = fallback.clone();
        for entry in self.entries.iter() {
            if excluding.contains(entry.key()) {
                continue;
            }
            offsets.merge_min(&entry.value().min_offsets);
        }
        offsets
    }

    pub fn state(&self, key: &AggregateKey) -> Option<EntryState> {
        self.entries.get(key).map(|entry| entry.state)
    }

    /// Copy of the partial aggregate held for `key`
    pub fn snapshot(&self, key: &AggregateKey) -> Option<PartialAggregate> {
        self.entries.get(key).map(|entry| entry.partial.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

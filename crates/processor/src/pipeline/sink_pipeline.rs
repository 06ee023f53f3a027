//! Sink pipeline: engine, trigger, sink and checkpoint for one spec
//!
//! A pipeline runs as a single task. Events and trigger ticks are handled
//! one at a time inside the same `select!` loop, so a tick always sees a
//! stable engine and a shutdown can only land between two steps.
//!
//! Each tick:
//!
//! 1. seals every closed window (state is kept)
//! 2. writes the batch, if any; on failure the tick ends and the same
//!    records are offered again next time
//! 3. commits the checkpoint; on failure the pipeline halts
//! 4. drops the sealed state

use super::engine::{EngineStats, IngestOutcome, WindowAggregationEngine};
use super::health::{HealthRegistry, PipelineHealth};
use crate::config::AggregationSpec;
use crate::core::IngestedEvent;
use crate::error::{ProcessorError, Result};
use crate::metrics::{PipelineMetrics, ProcessorMetrics};
use crate::sink::SinkWriter;
use crate::source::SourceOffsets;
use crate::state::{Checkpoint, CheckpointManager, CheckpointStore, CommitOutcome};

use sales_kpi_types::AggregateRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of one trigger tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to emit
    Idle,
    /// A batch was written and checkpointed
    Emitted { batch_id: u64, records: usize },
    /// The sink rejected the batch; it stays pending
    SinkFailed { batch_id: u64 },
}

/// Summary of a finished pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub pipeline_id: String,
    /// Id the next batch would have used
    pub next_batch_id: u64,
    pub stats: EngineStats,
}

/// One aggregation spec wired to its sink and checkpoint
pub struct SinkPipeline {
    engine: WindowAggregationEngine,
    sink: Box<dyn SinkWriter<AggregateRecord>>,
    checkpoints: CheckpointManager,
    trigger_interval: Duration,
    next_batch_id: u64,
    metrics: PipelineMetrics,
    health: HealthRegistry,
}

impl SinkPipeline {
    pub fn new(
        spec: &AggregationSpec,
        sink: Box<dyn SinkWriter<AggregateRecord>>,
        store: Arc<dyn CheckpointStore>,
        metrics: &ProcessorMetrics,
        health: HealthRegistry,
    ) -> Result<Self> {
        spec.validate()?;
        health.set(&spec.id, PipelineHealth::Starting);

        Ok(Self {
            engine: WindowAggregationEngine::new(spec)?,
            sink,
            checkpoints: CheckpointManager::new(spec.id.clone(), store),
            trigger_interval: spec.trigger_interval(),
            next_batch_id: 0,
            metrics: metrics.pipeline(&spec.id),
            health,
        })
    }

    pub fn id(&self) -> &str {
        self.engine.pipeline_id()
    }

    /// Load the checkpoint and position the engine after it
    ///
    /// A store failure halts the pipeline, as a failed commit would.
    pub async fn restore(&mut self) -> Result<()> {
        let restored = match self.checkpoints.restore().await {
            Ok(restored) => restored,
            Err(e) => return Err(self.halt(e.into())),
        };
        if let Some(checkpoint) = restored {
            self.engine.restore(&checkpoint);
            self.next_batch_id = checkpoint.next_batch_id;
        }
        self.update_gauges();
        Ok(())
    }

    /// First offsets this pipeline needs to read
    pub fn resume_offsets(&self) -> &SourceOffsets {
        self.engine.resume_offsets()
    }

    pub fn engine(&self) -> &WindowAggregationEngine {
        &self.engine
    }

    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    fn update_gauges(&self) {
        let watermark = self.engine.watermark();
        if !watermark.is_min() {
            self.metrics.watermark_ms.set(watermark.timestamp);
        }
        self.metrics
            .open_windows
            .set(i64::try_from(self.engine.open_windows()).unwrap_or(i64::MAX));
    }

    /// Route one event into the engine
    ///
    /// Events the engine cannot aggregate are counted as rejected.
    pub fn ingest(&mut self, event: &IngestedEvent) -> Result<IngestOutcome> {
        let outcome = match self.engine.ingest(event) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.events_rejected.inc();
                return Err(e);
            }
        };
        match outcome {
            IngestOutcome::LateDropped => {
                self.metrics.late_events_dropped.inc();
                debug!(
                    pipeline = %self.id(),
                    partition = event.partition,
                    offset = event.offset,
                    event_time = %event.event.timestamp(),
                    watermark = %self.engine.watermark(),
                    "Dropped late event"
                );
            }
            IngestOutcome::Merged | IngestOutcome::Replayed | IngestOutcome::AlreadyEmitted => {}
        }
        Ok(outcome)
    }

    /// Seal, write and checkpoint whatever is ready
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let batch = self.engine.prepare_seal()?;
        let batch_id = self.next_batch_id;

        if !batch.is_empty() {
            if let Err(e) = self.sink.write(batch_id, &batch.records).await {
                self.metrics.sink_write_failures.inc();
                warn!(
                    pipeline = %self.id(),
                    sink = %self.sink.name(),
                    batch_id,
                    records = batch.len(),
                    error = %e,
                    "Sink write failed, batch stays pending"
                );
                return Ok(TickOutcome::SinkFailed { batch_id });
            }
            self.metrics.records_emitted.inc_by(batch.len() as u64);
        }

        let next_batch_id = batch_id + u64::from(!batch.is_empty());
        let checkpoint = Checkpoint::new(
            self.id(),
            next_batch_id,
            batch.resume_offsets.clone(),
            batch.source_high.clone(),
            batch.watermark,
            batch.last_window_end,
        );
        if self.checkpoints.commit(checkpoint).await? == CommitOutcome::Committed {
            self.metrics.checkpoint_commits.inc();
        }

        self.engine.complete_seal(&batch);
        self.next_batch_id = next_batch_id;
        self.update_gauges();

        if batch.is_empty() {
            return Ok(TickOutcome::Idle);
        }
        info!(
            pipeline = %self.id(),
            batch_id,
            records = batch.len(),
            watermark = %batch.watermark,
            "Emitted batch"
        );
        Ok(TickOutcome::Emitted {
            batch_id,
            records: batch.len(),
        })
    }

    fn report(&self) -> PipelineReport {
        PipelineReport {
            pipeline_id: self.id().to_string(),
            next_batch_id: self.next_batch_id,
            stats: self.engine.stats().clone(),
        }
    }

    fn halt(&self, err: ProcessorError) -> ProcessorError {
        self.metrics.checkpoint_failures.inc();
        error!(pipeline = %self.id(), error = %err, "Pipeline halted");
        self.health.set(
            self.id(),
            PipelineHealth::Halted {
                reason: err.to_string(),
            },
        );
        ProcessorError::Pipeline {
            pipeline: self.id().to_string(),
            reason: err.to_string(),
        }
    }

    /// Consume events and tick until shutdown or until the sender closes
    ///
    /// A closed channel means the source is finished: one last tick runs
    /// before the pipeline stops.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<IngestedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PipelineReport> {
        self.health.set(self.id(), PipelineHealth::Running);
        info!(
            pipeline = %self.id(),
            trigger_interval_ms = self.trigger_interval.as_millis() as u64,
            "Pipeline started"
        );

        let mut ticker = time::interval_at(
            Instant::now() + self.trigger_interval,
            self.trigger_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        return Err(self.halt(e));
                    }
                }
                received = events.recv() => match received {
                    Some(event) => {
                        if let Err(e) = self.ingest(&event) {
                            warn!(
                                pipeline = %self.id(),
                                offset = event.offset,
                                error = %e,
                                "Skipping event"
                            );
                        }
                    }
                    None => {
                        debug!(pipeline = %self.id(), "Input closed, running final tick");
                        if let Err(e) = self.tick().await {
                            return Err(self.halt(e));
                        }
                        break;
                    }
                },
            }
        }

        self.health.set(self.id(), PipelineHealth::Stopped);
        info!(pipeline = %self.id(), batches = self.next_batch_id, "Pipeline stopped");
        Ok(self.report())
    }
}

impl std::fmt::Debug for SinkPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkPipeline")
            .field("id", &self.id())
            .field("sink", &self.sink.name())
            .field("next_batch_id", &self.next_batch_id)
            .finish_non_exhaustive()
    }
}

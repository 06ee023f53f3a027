//! Enriched event echo
//!
//! Prints every enriched event once, grouped into micro-batches by trigger
//! interval. There is no windowing and no checkpoint: after a restart the
//! echo simply continues from wherever the source resumes.

use super::health::{HealthRegistry, PipelineHealth};
use crate::core::IngestedEvent;
use crate::error::Result;
use crate::sink::SinkWriter;

use sales_kpi_types::EnrichedEvent;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const ENRICHED_PIPELINE_ID: &str = "enriched_events";

/// Micro-batching echo of enriched events
pub struct EnrichedConsolePipeline {
    sink: Box<dyn SinkWriter<EnrichedEvent>>,
    trigger_interval: Duration,
    buffer: Vec<EnrichedEvent>,
    next_batch_id: u64,
    health: HealthRegistry,
}

impl EnrichedConsolePipeline {
    pub fn new(
        sink: Box<dyn SinkWriter<EnrichedEvent>>,
        trigger_interval: Duration,
        health: HealthRegistry,
    ) -> Self {
        health.set(ENRICHED_PIPELINE_ID, PipelineHealth::Starting);
        Self {
            sink,
            trigger_interval,
            buffer: Vec::new(),
            next_batch_id: 0,
            health,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_batch_id(&self) -> u64 {
        self.next_batch_id
    }

    pub fn push(&mut self, event: &IngestedEvent) {
        self.buffer.push(event.event.as_ref().clone());
    }

    /// Write the buffered events as one batch
    ///
    /// Returns the number of rows written. On failure the buffer is kept
    /// and retried under the same batch id.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch_id = self.next_batch_id;
        self.sink.write(batch_id, &self.buffer).await?;

        let written = self.buffer.len();
        self.buffer.clear();
        self.next_batch_id += 1;
        debug!(batch_id, rows = written, "Printed enriched batch");
        Ok(written)
    }

    async fn flush_logged(&mut self) {
        if let Err(e) = self.flush().await {
            warn!(
                sink = %self.sink.name(),
                batch_id = self.next_batch_id,
                rows = self.buffer.len(),
                error = %e,
                "Enriched batch write failed"
            );
        }
    }

    /// Buffer events and flush them every trigger interval
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<IngestedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u64> {
        self.health.set(ENRICHED_PIPELINE_ID, PipelineHealth::Running);
        info!(
            pipeline = ENRICHED_PIPELINE_ID,
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
                _ = ticker.tick() => self.flush_logged().await,
                received = events.recv() => match received {
                    Some(event) => self.push(&event),
                    None => {
                        self.flush_logged().await;
                        break;
                    }
                },
            }
        }

        self.health.set(ENRICHED_PIPELINE_ID, PipelineHealth::Stopped);
        info!(pipeline = ENRICHED_PIPELINE_ID, batches = self.next_batch_id, "Pipeline stopped");
        Ok(self.next_batch_id)
    }
}

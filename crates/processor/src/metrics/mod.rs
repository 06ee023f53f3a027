//! Prometheus metrics for the KPI engine
//!
//! [`ProcessorMetrics`] holds every counter and gauge the engine updates and
//! registers them on a [`MetricsRegistry`] under the `sales_kpi` prefix.
//! Counters carry the `_total` suffix once encoded.

mod registry;

pub use registry::MetricsRegistry;

use crate::error::ParseFailureReason;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use thiserror::Error;

/// Errors that can occur in the metrics subsystem
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metric encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Labels for per-pipeline metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PipelineLabels {
    pub pipeline: String,
}

impl PipelineLabels {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
        }
    }
}

/// Labels for parse failures
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ParseErrorLabels {
    pub reason: String,
}

/// All engine metrics
///
/// Cloning is cheap; clones update the same underlying metrics.
#[derive(Clone, Debug, Default)]
pub struct ProcessorMetrics {
    pub events_ingested: Counter,
    pub parse_errors: Family<ParseErrorLabels, Counter>,
    pub late_events_dropped: Family<PipelineLabels, Counter>,
    pub events_rejected: Family<PipelineLabels, Counter>,
    pub records_emitted: Family<PipelineLabels, Counter>,
    pub sink_write_failures: Family<PipelineLabels, Counter>,
    pub checkpoint_commits: Family<PipelineLabels, Counter>,
    pub checkpoint_failures: Family<PipelineLabels, Counter>,
    pub watermark_ms: Family<PipelineLabels, Gauge>,
    pub open_windows: Family<PipelineLabels, Gauge>,
}

impl ProcessorMetrics {
    /// Create the metrics and register them on `registry`
    pub fn register(registry: &MetricsRegistry) -> Self {
        let metrics = Self::default();
        let registry = registry.registry();
        let mut registry = registry.write();

        registry.register(
            "events_ingested",
            "Events parsed and broadcast to pipelines",
            metrics.events_ingested.clone(),
        );
        registry.register(
            "parse_errors",
            "Payloads that could not be parsed",
            metrics.parse_errors.clone(),
        );
        registry.register(
            "late_events_dropped",
            "Events dropped because their window was already closed",
            metrics.late_events_dropped.clone(),
        );
        registry.register(
            "events_rejected",
            "Events a pipeline could not aggregate",
            metrics.events_rejected.clone(),
        );
        registry.register(
            "records_emitted",
            "Aggregate records written to sinks",
            metrics.records_emitted.clone(),
        );
        registry.register(
            "sink_write_failures",
            "Failed sink writes",
            metrics.sink_write_failures.clone(),
        );
        registry.register(
            "checkpoint_commits",
            "Checkpoints committed",
            metrics.checkpoint_commits.clone(),
        );
        registry.register(
            "checkpoint_failures",
            "Checkpoint commits that failed",
            metrics.checkpoint_failures.clone(),
        );
        registry.register(
            "watermark_ms",
            "Current watermark in milliseconds since epoch",
            metrics.watermark_ms.clone(),
        );
        registry.register(
            "open_windows",
            "Window aggregates currently held in memory",
            metrics.open_windows.clone(),
        );

        metrics
    }

    pub fn record_parse_error(&self, reason: ParseFailureReason) {
        self.parse_errors
            .get_or_create(&ParseErrorLabels {
                reason: reason.as_str().to_string(),
            })
            .inc();
    }

    /// Handles for one pipeline
    pub fn pipeline(&self, pipeline: &str) -> PipelineMetrics {
        let labels = PipelineLabels::new(pipeline);
        PipelineMetrics {
            late_events_dropped: self.late_events_dropped.get_or_create(&labels).clone(),
            events_rejected: self.events_rejected.get_or_create(&labels).clone(),
            records_emitted: self.records_emitted.get_or_create(&labels).clone(),
            sink_write_failures: self.sink_write_failures.get_or_create(&labels).clone(),
            checkpoint_commits: self.checkpoint_commits.get_or_create(&labels).clone(),
            checkpoint_failures: self.checkpoint_failures.get_or_create(&labels).clone(),
            watermark_ms: self.watermark_ms.get_or_create(&labels).clone(),
            open_windows: self.open_windows.get_or_create(&labels).clone(),
        }
    }
}

/// Metric handles bound to one pipeline's labels
#[derive(Clone, Debug, Default)]
pub struct PipelineMetrics {
    pub late_events_dropped: Counter,
    pub events_rejected: Counter,
    pub records_emitted: Counter,
    pub sink_write_failures: Counter,
    pub checkpoint_commits: Counter,
    pub checkpoint_failures: Counter,
    pub watermark_ms: Gauge,
    pub open_windows: Gauge,
}

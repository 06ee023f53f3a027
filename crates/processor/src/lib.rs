//! Sales KPI stream engine
//!
//! Reads invoice events from a message source, enriches them, and computes
//! event-time tumbling-window KPIs. Every aggregation runs as its own
//! pipeline with a watermark, a trigger, a sink and a checkpoint, so a
//! restart neither loses nor duplicates emitted windows.
//!
//! ```text
//! source -> parse -> enrich -+-> pipeline (engine -> sink, checkpoint)
//!                            +-> pipeline ...
//!                            +-> enriched echo (optional)
//! ```

pub mod aggregation;
pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod state;
pub mod watermark;
pub mod window;

pub use crate::core::{Enricher, EventParser, GroupBy, IngestedEvent};

pub use aggregation::{Metric, MetricAccumulator, PartialAggregate};

pub use config::{AggregationSpec, CheckpointConfig, EngineConfig, SinkConfig, SourceConfig};

pub use error::{
    AggregationError, ParseFailure, ParseFailureReason, ProcessorError, Result as ProcessorResult,
    SinkError, SourceError, StateError, WindowError,
};

pub use metrics::{MetricsRegistry, ProcessorMetrics};

pub use pipeline::{
    ExecutorReport, HealthRegistry, IngestOutcome, PipelineHealth, SinkPipeline, StreamExecutor,
    TickOutcome, WindowAggregationEngine,
};

pub use sink::{ConsoleSink, JsonDirectorySink, MemorySink, OutputRow, SinkWriter};

pub use source::{FileSource, MemorySource, MessageSource, SourceOffsets};

pub use state::{Checkpoint, CheckpointManager, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

pub use watermark::{Watermark, WatermarkTracker};

pub use window::{TumblingWindowAssigner, Window, WindowBounds};

//! Sink pipelines and the executor driving them
//!
//! Every [`AggregationSpec`](crate::config::AggregationSpec) becomes one
//! [`SinkPipeline`]: a [`WindowAggregationEngine`] plus its trigger, sink and
//! checkpoint. The [`StreamExecutor`] reads the source once and feeds every
//! pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use processor::config::EngineConfig;
//! use processor::metrics::MetricsRegistry;
//! use processor::pipeline::{build_checkpoint_store, build_source, StreamExecutor};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let registry = MetricsRegistry::new();
//!
//! let executor = StreamExecutor::from_config(
//!     config.clone(),
//!     build_source(&config.source)?,
//!     build_checkpoint_store(&config.checkpoint),
//!     &registry,
//! )?;
//! let shutdown = executor.shutdown_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     shutdown.shutdown();
//! });
//!
//! let report = executor.run().await?;
//! println!("{} events", report.ingestion.events);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod executor;
pub mod health;
pub mod passthrough;
pub mod sink_pipeline;

pub use engine::{EngineStats, IngestOutcome, SealBatch, WindowAggregationEngine};
pub use executor::{
    build_checkpoint_store, build_sink, build_source, ExecutorReport, IngestionStats,
    ShutdownHandle, StreamExecutor,
};
pub use health::{HealthRegistry, PipelineHealth};
pub use passthrough::{EnrichedConsolePipeline, ENRICHED_PIPELINE_ID};
pub use sink_pipeline::{PipelineReport, SinkPipeline, TickOutcome};

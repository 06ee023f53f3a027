//! Stream executor
//!
//! Owns the message source and fans every parsed, enriched event out to one
//! task per pipeline over bounded channels. A slow pipeline applies
//! backpressure to ingestion; a halted pipeline is dropped from the fan-out
//! while the others keep running.
//!
//! Startup restores every pipeline's checkpoint first, then seeks the source
//! to the lowest resume offset any pipeline needs. Pipelines skip what they
//! already covered.

use super::health::{HealthRegistry, PipelineHealth};
use super::passthrough::{EnrichedConsolePipeline, ENRICHED_PIPELINE_ID};
use super::sink_pipeline::{PipelineReport, SinkPipeline};
use crate::config::{
    AggregationSpec, CheckpointConfig, CheckpointKind, EngineConfig, SinkConfig, SourceConfig,
    SourceKind, StartingOffsets,
};
use crate::core::{Enricher, EventParser, IngestedEvent};
use crate::error::{ProcessorError, Result, SourceError};
use crate::metrics::{MetricsRegistry, ProcessorMetrics};
use crate::sink::{ConsoleSink, JsonDirectorySink, SinkWriter};
use crate::source::{Backoff, FileSource, MemorySource, MessageSource, SourceMessage, SourceOffsets};
use crate::state::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

use sales_kpi_types::{AggregateRecord, EnrichedEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Build the configured message source
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn MessageSource>> {
    match config.kind {
        SourceKind::File => {
            let path = config.path.as_ref().ok_or_else(|| SourceError::InvalidConfig {
                reason: "file source requires a path".to_string(),
            })?;
            Ok(Box::new(FileSource::new(path)))
        }
        SourceKind::Memory => Ok(Box::new(MemorySource::from_payloads(Vec::<Vec<u8>>::new()))),
        #[cfg(feature = "kafka")]
        SourceKind::Kafka => Ok(Box::new(crate::source::KafkaSource::new(config)?)),
        #[cfg(not(feature = "kafka"))]
        SourceKind::Kafka => Err(SourceError::InvalidConfig {
            reason: "built without the `kafka` feature".to_string(),
        }
        .into()),
    }
}

/// Build the configured checkpoint store
pub fn build_checkpoint_store(config: &CheckpointConfig) -> Arc<dyn CheckpointStore> {
    match config.kind {
        CheckpointKind::File => Arc::new(FileCheckpointStore::new(&config.path)),
        CheckpointKind::Memory => Arc::new(InMemoryCheckpointStore::new()),
    }
}

/// Build the sink a spec writes to
pub fn build_sink(spec: &AggregationSpec) -> Box<dyn SinkWriter<AggregateRecord>> {
    match &spec.sink {
        SinkConfig::Console { truncate } => Box::new(ConsoleSink::stdout(spec.id.clone(), *truncate)),
        SinkConfig::JsonDirectory { path } => {
            Box::new(JsonDirectorySink::new(spec.id.clone(), path))
        }
    }
}

/// Requests a running executor to stop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // Only fails once every receiver is gone, i.e. already stopped
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub messages: u64,
    pub events: u64,
    pub parse_errors: u64,
    pub source_errors: u64,
}

/// Outcome of a finished executor run
#[derive(Debug, Default)]
pub struct ExecutorReport {
    pub ingestion: IngestionStats,
    /// Pipelines that stopped cleanly
    pub pipelines: Vec<PipelineReport>,
    /// Pipelines that halted, with the error
    pub failures: Vec<(String, ProcessorError)>,
    pub health: BTreeMap<String, PipelineHealth>,
}

impl ExecutorReport {
    pub fn pipeline(&self, id: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|report| report.pipeline_id == id)
    }
}

struct Route {
    pipeline: String,
    tx: mpsc::Sender<IngestedEvent>,
}

/// Runs the source and every pipeline
pub struct StreamExecutor {
    config: EngineConfig,
    source: Box<dyn MessageSource>,
    store: Arc<dyn CheckpointStore>,
    pipelines: Vec<SinkPipeline>,
    enriched: Option<EnrichedConsolePipeline>,
    parser: EventParser,
    enricher: Enricher,
    metrics: ProcessorMetrics,
    health: HealthRegistry,
    shutdown_tx: Arc<watch::Sender<bool>>,
    stats: IngestionStats,
}

impl StreamExecutor {
    /// Executor without pipelines; add them with [`add_pipeline`](Self::add_pipeline)
    pub fn new(
        config: EngineConfig,
        source: Box<dyn MessageSource>,
        store: Arc<dyn CheckpointStore>,
        registry: &MetricsRegistry,
    ) -> Result<Self> {
        config.source.validate()?;
        if config.channel_capacity == 0 {
            return Err(ProcessorError::Configuration(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            source,
            store,
            pipelines: Vec::new(),
            enriched: None,
            parser: EventParser::new(),
            enricher: Enricher::new(),
            metrics: ProcessorMetrics::register(registry),
            health: HealthRegistry::new(),
            shutdown_tx: Arc::new(shutdown_tx),
            stats: IngestionStats::default(),
        })
    }

    /// Executor with every configured pipeline and its configured sink
    pub fn from_config(
        config: EngineConfig,
        source: Box<dyn MessageSource>,
        store: Arc<dyn CheckpointStore>,
        registry: &MetricsRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let specs = config.specs.clone();
        let enriched = config.enriched_console.clone();

        let mut executor = Self::new(config, source, store, registry)?;
        for spec in &specs {
            executor.add_pipeline(spec, build_sink(spec))?;
        }
        if enriched.enabled {
            executor.set_enriched_sink(Box::new(ConsoleSink::stdout(
                ENRICHED_PIPELINE_ID,
                enriched.truncate,
            )));
        }
        Ok(executor)
    }

    /// Register a pipeline writing to `sink`
    pub fn add_pipeline(
        &mut self,
        spec: &AggregationSpec,
        sink: Box<dyn SinkWriter<AggregateRecord>>,
    ) -> Result<()> {
        if spec.id == ENRICHED_PIPELINE_ID || self.pipelines.iter().any(|p| p.id() == spec.id) {
            return Err(ProcessorError::Configuration(format!(
                "duplicate pipeline id '{}'",
                spec.id
            )));
        }
        let pipeline = SinkPipeline::new(
            spec,
            sink,
            Arc::clone(&self.store),
            &self.metrics,
            self.health.clone(),
        )?;
        self.pipelines.push(pipeline);
        Ok(())
    }

    /// Echo every enriched event to `sink`
    pub fn set_enriched_sink(&mut self, sink: Box<dyn SinkWriter<EnrichedEvent>>) {
        self.enriched = Some(EnrichedConsolePipeline::new(
            sink,
            self.config.enriched_console.trigger_interval(),
            self.health.clone(),
        ));
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    pub fn pipeline_ids(&self) -> Vec<String> {
        self.pipelines.iter().map(|p| p.id().to_string()).collect()
    }

    /// Restore every pipeline and decide where the source resumes
    ///
    /// Pipelines whose checkpoint cannot be loaded are halted and returned
    /// with their error; the rest are kept. The offsets are `None` when the
    /// source should start from its configured starting position.
    async fn restore(&mut self) -> (Option<SourceOffsets>, Vec<(String, ProcessorError)>) {
        let mut resume: Option<SourceOffsets> = None;
        let mut fresh = false;
        let mut failures = Vec::new();
        let mut restored = Vec::with_capacity(self.pipelines.len());

        for mut pipeline in std::mem::take(&mut self.pipelines) {
            if let Err(e) = pipeline.restore().await {
                failures.push((pipeline.id().to_string(), e));
                continue;
            }
            restored.push(pipeline);
        }
        self.pipelines = restored;

        for pipeline in &self.pipelines {
            let offsets = pipeline.resume_offsets();
            if offsets.is_empty() {
                fresh = true;
                continue;
            }
            match &mut resume {
                Some(resume) => resume.merge_min(offsets),
                None => resume = Some(offsets.clone()),
            }
        }

        // A pipeline without a checkpoint wants everything from the start
        if fresh && self.config.source.starting_offsets == StartingOffsets::Earliest {
            return (None, failures);
        }
        (resume, failures)
    }

    /// Run until shutdown, or until the source ends with `stop_at_source_end`
    pub async fn run(mut self) -> Result<ExecutorReport> {
        info!(
            source = %self.source.id(),
            pipelines = self.pipelines.len(),
            enriched_console = self.enriched.is_some(),
            "Starting stream executor"
        );

        let (resume, restore_failures) = self.restore().await;
        if let Some(offsets) = resume {
            info!(source = %self.source.id(), resume = %offsets, "Seeking source");
            self.source.seek(&offsets).await?;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let capacity = self.config.channel_capacity;
        let mut routes = Vec::new();
        let mut tasks: Vec<(String, JoinHandle<Result<PipelineReport>>)> = Vec::new();

        for pipeline in std::mem::take(&mut self.pipelines) {
            let (tx, rx) = mpsc::channel(capacity);
            let id = pipeline.id().to_string();
            routes.push(Route {
                pipeline: id.clone(),
                tx,
            });
            tasks.push((id, tokio::spawn(pipeline.run(rx, self.shutdown_tx.subscribe()))));
        }

        let enriched_task = self.enriched.take().map(|pipeline| {
            let (tx, rx) = mpsc::channel(capacity);
            routes.push(Route {
                pipeline: ENRICHED_PIPELINE_ID.to_string(),
                tx,
            });
            tokio::spawn(pipeline.run(rx, self.shutdown_tx.subscribe()))
        });

        let ingestion = self.ingest_loop(&mut routes, &mut shutdown_rx).await;

        // Closing the channels lets each pipeline run its final tick
        drop(routes);
        if let Err(e) = &ingestion {
            error!(error = %e, "Ingestion failed, stopping pipelines");
            self.shutdown_tx.send_replace(true);
        }

        let mut report = ExecutorReport {
            failures: restore_failures,
            ..ExecutorReport::default()
        };
        for (id, task) in tasks {
            match task.await {
                Ok(Ok(pipeline)) => report.pipelines.push(pipeline),
                Ok(Err(e)) => report.failures.push((id, e)),
                Err(e) => report.failures.push((
                    id.clone(),
                    ProcessorError::Pipeline {
                        pipeline: id,
                        reason: e.to_string(),
                    },
                )),
            }
        }
        if let Some(task) = enriched_task {
            match task.await {
                Ok(Ok(batches)) => debug!(batches, "Enriched echo stopped"),
                Ok(Err(e)) => warn!(error = %e, "Enriched echo failed"),
                Err(e) => warn!(error = %e, "Enriched echo task panicked"),
            }
        }

        ingestion?;
        report.ingestion = self.stats.clone();
        report.health = self.health.snapshot();
        info!(
            events = report.ingestion.events,
            parse_errors = report.ingestion.parse_errors,
            halted = report.failures.len(),
            "Stream executor stopped"
        );
        Ok(report)
    }

    async fn ingest_loop(
        &mut self,
        routes: &mut Vec<Route>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let poll_timeout = self.config.source.poll_timeout();
        let mut backoff = Backoff::new(
            self.config.source.retry_backoff(),
            self.config.source.max_retry_backoff(),
        );

        while !*shutdown.borrow() {
            if routes.is_empty() {
                warn!("No running pipelines left, stopping ingestion");
                break;
            }

            let polled = tokio::select! {
                biased;

                _ = shutdown.changed() => continue,
                polled = self.source.poll(poll_timeout) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    backoff.reset();
                    self.dispatch(message, routes).await;
                }
                Ok(None) => {
                    if self.config.stop_at_source_end && self.source.is_exhausted() {
                        info!(source = %self.source.id(), "Source exhausted");
                        break;
                    }
                }
                Err(e) if e.is_retryable() => {
                    self.stats.source_errors += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        source = %self.source.id(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Source unavailable, retrying"
                    );
                    tokio::select! {
                        biased;

                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, message: SourceMessage, routes: &mut Vec<Route>) {
        self.stats.messages += 1;

        let sales = match self.parser.parse(&message.payload) {
            Ok(sales) => sales,
            Err(failure) => {
                self.stats.parse_errors += 1;
                self.metrics.record_parse_error(failure.reason);
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    reason = %failure.reason,
                    detail = %failure.detail,
                    "Dropping unparseable payload"
                );
                return;
            }
        };

        let event = IngestedEvent::new(
            message.partition,
            message.offset,
            self.enricher.enrich(sales),
        );
        self.stats.events += 1;
        self.metrics.events_ingested.inc();

        let mut closed = Vec::new();
        for (index, route) in routes.iter().enumerate() {
            if route.tx.send(event.clone()).await.is_err() {
                closed.push(index);
            }
        }
        for index in closed.into_iter().rev() {
            let route = routes.remove(index);
            warn!(pipeline = %route.pipeline, "Pipeline stopped receiving events");
        }
    }
}

impl std::fmt::Debug for StreamExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamExecutor")
            .field("source", &self.source.id())
            .field("pipelines", &self.pipeline_ids())
            .field("enriched", &self.enriched.is_some())
            .finish_non_exhaustive()
    }
}

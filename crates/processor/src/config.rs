//! Configuration types for the KPI engine
//!
//! This module provides configuration structures for the source, checkpoint
//! store, the enriched console stream and every aggregation pipeline. All
//! structures deserialize with defaults so that a minimal file is enough.

use crate::aggregation::Metric;
use crate::core::GroupBy;
use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where events are read from
    #[serde(default)]
    pub source: SourceConfig,

    /// Where pipeline checkpoints are stored
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Capacity of each pipeline's event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Stop once a bounded source is exhausted
    #[serde(default)]
    pub stop_at_source_end: bool,

    /// Console echo of the enriched stream
    #[serde(default)]
    pub enriched_console: EnrichedConsoleConfig,

    /// Aggregation pipelines
    #[serde(default = "default_specs")]
    pub specs: Vec<AggregationSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            checkpoint: CheckpointConfig::default(),
            channel_capacity: default_channel_capacity(),
            stop_at_source_end: false,
            enriched_console: EnrichedConsoleConfig::default(),
            specs: default_specs(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.checkpoint.validate()?;
        self.enriched_console.validate()?;

        if self.channel_capacity == 0 {
            return Err(ProcessorError::Configuration(
                "channel_capacity must be greater than 0".into(),
            ));
        }

        if self.specs.is_empty() {
            return Err(ProcessorError::Configuration(
                "at least one aggregation spec is required".into(),
            ));
        }

        let mut ids = HashSet::new();
        for spec in &self.specs {
            spec.validate()?;
            if !ids.insert(spec.id.as_str()) {
                return Err(ProcessorError::Configuration(format!(
                    "duplicate spec id '{}'",
                    spec.id
                )));
            }
        }

        Ok(())
    }
}

/// Kind of message source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Kafka topic (requires the `kafka` feature)
    Kafka,
    /// Newline-delimited JSON file
    File,
    /// Empty in-memory log, fed programmatically
    #[default]
    Memory,
}

/// Where to start reading when no checkpoint exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartingOffsets {
    Earliest,
    #[default]
    Latest,
}

/// Message source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Kafka bootstrap servers
    #[serde(default)]
    pub brokers: Option<String>,

    /// Kafka topic
    #[serde(default)]
    pub topic: Option<String>,

    /// Kafka consumer group
    #[serde(default = "default_group_id")]
    pub group_id: String,

    #[serde(default)]
    pub starting_offsets: StartingOffsets,

    /// Input file for the file source
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upper bound of a single poll in milliseconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Initial backoff after a source failure in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_retry_backoff")]
    pub max_retry_backoff_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            brokers: None,
            topic: None,
            group_id: default_group_id(),
            starting_offsets: StartingOffsets::default(),
            path: None,
            poll_timeout_ms: default_poll_timeout(),
            retry_backoff_ms: default_retry_backoff(),
            max_retry_backoff_ms: default_max_retry_backoff(),
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            SourceKind::Kafka => {
                if self.brokers.as_deref().map_or(true, str::is_empty) {
                    return Err(ProcessorError::Configuration(
                        "kafka source requires brokers".into(),
                    ));
                }
                if self.topic.as_deref().map_or(true, str::is_empty) {
                    return Err(ProcessorError::Configuration(
                        "kafka source requires topic".into(),
                    ));
                }
            }
            SourceKind::File => {
                if self.path.is_none() {
                    return Err(ProcessorError::Configuration(
                        "file source requires path".into(),
                    ));
                }
            }
            SourceKind::Memory => {}
        }

        if self.poll_timeout_ms == 0 {
            return Err(ProcessorError::Configuration(
                "poll_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.retry_backoff_ms == 0 || self.max_retry_backoff_ms < self.retry_backoff_ms {
            return Err(ProcessorError::Configuration(
                "retry backoff must be positive and not exceed max_retry_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.max_retry_backoff_ms)
    }
}

/// Kind of checkpoint store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// JSON documents in a directory
    #[default]
    File,
    /// Process memory only, nothing survives a restart
    Memory,
}

/// Checkpoint store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub kind: CheckpointKind,

    /// Directory of the file store
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            kind: CheckpointKind::default(),
            path: default_checkpoint_path(),
        }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == CheckpointKind::File && self.path.as_os_str().is_empty() {
            return Err(ProcessorError::Configuration(
                "file checkpoint store requires path".into(),
            ));
        }
        Ok(())
    }
}

/// Console echo of every enriched event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedConsoleConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Print interval in milliseconds
    #[serde(default = "default_interval")]
    pub trigger_interval_ms: u64,

    /// Cut long cells to 20 characters
    #[serde(default)]
    pub truncate: bool,
}

impl Default for EnrichedConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_interval_ms: default_interval(),
            truncate: false,
        }
    }
}

impl EnrichedConsoleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.trigger_interval_ms == 0 {
            return Err(ProcessorError::Configuration(
                "enriched_console.trigger_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }
}

/// Output of an aggregation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Batch tables on stdout
    Console {
        #[serde(default)]
        truncate: bool,
    },
    /// One JSON-lines file per batch
    JsonDirectory { path: PathBuf },
}

/// One aggregation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Pipeline id, also the checkpoint name
    pub id: String,

    /// Tumbling window size in milliseconds
    #[serde(default = "default_interval")]
    pub window_size_ms: u64,

    /// How far the watermark trails the newest event, in milliseconds
    #[serde(default = "default_interval")]
    pub allowed_lateness_ms: u64,

    /// Wall-clock interval between seal ticks, in milliseconds
    #[serde(default = "default_interval")]
    pub trigger_interval_ms: u64,

    #[serde(default)]
    pub group_by: GroupBy,

    /// Output columns in order
    pub metrics: Vec<Metric>,

    pub sink: SinkConfig,
}

impl AggregationSpec {
    /// Time-only spec with one-minute defaults
    pub fn new(id: impl Into<String>, metrics: Vec<Metric>, sink: SinkConfig) -> Self {
        Self {
            id: id.into(),
            window_size_ms: default_interval(),
            allowed_lateness_ms: default_interval(),
            trigger_interval_ms: default_interval(),
            group_by: GroupBy::None,
            metrics,
            sink,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            Err(ProcessorError::Configuration(format!(
                "spec '{}': {}",
                self.id, reason
            )))
        };

        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return invalid("id must be non-empty and use only [A-Za-z0-9_-]".into());
        }
        if self.window_size_ms == 0 {
            return invalid("window_size_ms must be greater than 0".into());
        }
        if self.trigger_interval_ms == 0 {
            return invalid("trigger_interval_ms must be greater than 0".into());
        }
        if i64::try_from(self.window_size_ms).is_err()
            || i64::try_from(self.allowed_lateness_ms).is_err()
        {
            return invalid("durations out of range".into());
        }
        if self.metrics.is_empty() {
            return invalid("at least one metric is required".into());
        }

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(*metric) {
                return invalid(format!("duplicate metric '{}'", metric));
            }
        }

        if let SinkConfig::JsonDirectory { path } = &self.sink {
            if path.as_os_str().is_empty() {
                return invalid("json_directory sink requires path".into());
            }
        }

        Ok(())
    }

    pub fn window_size(&self) -> Duration {
        Duration::from_millis(self.window_size_ms)
    }

    pub fn allowed_lateness(&self) -> Duration {
        Duration::from_millis(self.allowed_lateness_ms)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_interval_ms)
    }
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_group_id() -> String {
    "sales-kpi".to_string()
}

fn default_poll_timeout() -> u64 {
    100
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_max_retry_backoff() -> u64 {
    30_000
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_interval() -> u64 {
    60_000
}

/// The two pipelines of the retail KPI job
pub fn default_specs() -> Vec<AggregationSpec> {
    vec![
        AggregationSpec::new(
            "time_wise_kpi",
            vec![
                Metric::TotalVolumeOfSales,
                Metric::AverageTransactionSize,
                Metric::RateOfReturn,
            ],
            SinkConfig::JsonDirectory {
                path: PathBuf::from("time_wise_kpi"),
            },
        ),
        AggregationSpec {
            group_by: GroupBy::Country,
            ..AggregationSpec::new(
                "time_country_wise_kpi",
                vec![
                    Metric::TotalVolumeOfSales,
                    Metric::OrdersPerMinute,
                    Metric::RateOfReturn,
                ],
                SinkConfig::JsonDirectory {
                    path: PathBuf::from("time_country_wise_kpi"),
                },
            )
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.specs.len(), 2);
        assert_eq!(config.specs[1].group_by, GroupBy::Country);
        assert_eq!(config.specs[0].window_size(), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_minimal_spec() {
        let json = r#"{
            "source": {"kind": "file", "path": "events.jsonl"},
            "specs": [{
                "id": "kpi",
                "group_by": "country",
                "metrics": ["total_volume_of_sales", "OPM"],
                "sink": {"kind": "console", "truncate": true}
            }]
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.starting_offsets, StartingOffsets::Latest);
        assert_eq!(config.specs[0].allowed_lateness_ms, 60_000);
        assert_eq!(
            config.specs[0].metrics,
            vec![Metric::TotalVolumeOfSales, Metric::OrdersPerMinute]
        );
        assert_eq!(config.specs[0].sink, SinkConfig::Console { truncate: true });
    }

    #[test]
    fn test_missing_specs_use_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.specs[0].id, "time_wise_kpi");
        assert_eq!(config.specs[1].id, "time_country_wise_kpi");
    }

    #[test]
    fn test_reject_zero_window() {
        let mut config = EngineConfig::default();
        config.specs[0].window_size_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_duplicate_metric() {
        let mut config = EngineConfig::default();
        config.specs[0].metrics.push(Metric::RateOfReturn);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_empty_metrics() {
        let mut config = EngineConfig::default();
        config.specs[0].metrics.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_duplicate_ids() {
        let mut config = EngineConfig::default();
        config.specs[1].id = config.specs[0].id.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_unsafe_id() {
        let mut config = EngineConfig::default();
        config.specs[0].id = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kafka_requires_topic() {
        let mut config = EngineConfig::default();
        config.source.kind = SourceKind::Kafka;
        config.source.brokers = Some("localhost:9092".to_string());
        assert!(config.validate().is_err());

        config.source.topic = Some("real-time-project".to_string());
        assert!(config.validate().is_ok());
    }
}

//! Kafka topic source
//!
//! Partitions are assigned manually rather than through group rebalancing:
//! resume positions come from pipeline checkpoints, so the consumer never
//! commits offsets to the broker (`enable.auto.commit=false`).

use super::{MessageSource, SourceMessage, SourceOffsets};
use crate::config::{SourceConfig, StartingOffsets};
use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{Message, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info, warn};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Source consuming one Kafka topic
pub struct KafkaSource {
    id: String,
    topic: String,
    starting_offsets: StartingOffsets,
    consumer: StreamConsumer,
    assigned: bool,
}

impl KafkaSource {
    /// Create the consumer; no connection is made until the first poll or seek
    pub fn new(config: &SourceConfig) -> SourceResult<Self> {
        let invalid = |reason: &str| SourceError::InvalidConfig {
            reason: reason.to_string(),
        };
        let brokers = config
            .brokers
            .as_deref()
            .ok_or_else(|| invalid("kafka source requires brokers"))?;
        let topic = config
            .topic
            .clone()
            .ok_or_else(|| invalid("kafka source requires topic"))?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| SourceError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            id: format!("kafka:{}", topic),
            topic,
            starting_offsets: config.starting_offsets,
            consumer,
            assigned: false,
        })
    }

    fn unavailable(&self, err: KafkaError) -> SourceError {
        SourceError::Unavailable {
            source_id: self.id.clone(),
            reason: err.to_string(),
        }
    }

    /// Assign every partition of the topic, starting from `offsets` where known
    fn assign(&mut self, offsets: &SourceOffsets) -> SourceResult<()> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(&self.topic), METADATA_TIMEOUT)
            .map_err(|e| self.unavailable(e))?;

        let partitions: Vec<i32> = metadata
            .topics()
            .iter()
            .filter(|topic| topic.name() == self.topic)
            .flat_map(|topic| topic.partitions().iter().map(|partition| partition.id()))
            .collect();
        if partitions.is_empty() {
            return Err(SourceError::Unavailable {
                source_id: self.id.clone(),
                reason: format!("topic '{}' has no partitions", self.topic),
            });
        }

        let default_offset = match self.starting_offsets {
            StartingOffsets::Earliest => Offset::Beginning,
            StartingOffsets::Latest => Offset::End,
        };

        let mut assignment = TopicPartitionList::new();
        for partition in &partitions {
            let offset = offsets
                .get(*partition)
                .map(Offset::Offset)
                .unwrap_or(default_offset);
            assignment
                .add_partition_offset(&self.topic, *partition, offset)
                .map_err(|e| SourceError::SeekFailed {
                    source_id: self.id.clone(),
                    reason: e.to_string(),
                })?;
        }

        self.consumer
            .assign(&assignment)
            .map_err(|e| SourceError::SeekFailed {
                source_id: self.id.clone(),
                reason: e.to_string(),
            })?;
        self.assigned = true;

        info!(
            topic = %self.topic,
            partitions = ?partitions,
            resume = %offsets,
            "Assigned topic partitions"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn poll(&mut self, timeout: Duration) -> SourceResult<Option<SourceMessage>> {
        if !self.assigned {
            self.assign(&SourceOffsets::new())?;
        }

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Ok(message)) => {
                let message = SourceMessage {
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                };
                debug!(partition = message.partition, offset = message.offset, "Received message");
                Ok(Some(message))
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Error polling message");
                Err(self.unavailable(err))
            }
        }
    }

    async fn seek(&mut self, offsets: &SourceOffsets) -> SourceResult<()> {
        self.assign(offsets)
    }
}

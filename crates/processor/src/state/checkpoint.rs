//! Pipeline checkpoints
//!
//! A checkpoint records how far one sink pipeline has durably progressed:
//! where to resume reading each source partition, the watermark every
//! emitted window is sealed through, and the id of the next batch. Partial
//! aggregates are not stored; they are rebuilt by replaying from the resume
//! offsets.
//!
//! Stores implement [`CheckpointStore`]; [`CheckpointManager`] wraps a store
//! for a single pipeline and refuses commits that would move it backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::source::SourceOffsets;
use crate::watermark::Watermark;

const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";
const FORMAT_VERSION: u32 = 1;

/// Durable progress of one pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Pipeline (spec) id
    pub pipeline_id: String,
    /// Id the next non-empty batch will be written with
    pub next_batch_id: u64,
    /// Per partition, the first offset a restart must read
    pub source_offsets: SourceOffsets,
    /// Per partition, the next unread offset when the checkpoint was taken
    pub source_high: SourceOffsets,
    /// Every window ending at or before this watermark has been emitted
    pub sealed_through: Watermark,
    /// End of the last emitted window, in milliseconds
    pub last_window_end: Option<i64>,
    /// When the checkpoint was committed
    pub committed_at: DateTime<Utc>,
    /// Format version
    pub version: u32,
    /// Integrity checksum over every other field
    pub checksum: String,
}

impl Checkpoint {
    /// Build a checkpoint stamped with the current time
    pub fn new(
        pipeline_id: impl Into<String>,
        next_batch_id: u64,
        source_offsets: SourceOffsets,
        source_high: SourceOffsets,
        sealed_through: Watermark,
        last_window_end: Option<i64>,
    ) -> Self {
        let mut checkpoint = Self {
            pipeline_id: pipeline_id.into(),
            next_batch_id,
            source_offsets,
            source_high,
            sealed_through,
            last_window_end,
            committed_at: Utc::now(),
            version: FORMAT_VERSION,
            checksum: String::new(),
        };
        checkpoint.checksum = checkpoint.calculate_checksum();
        checkpoint
    }

    /// SipHash-1-3 over the JSON encoding with an empty checksum field
    fn calculate_checksum(&self) -> String {
        let mut body = self.clone();
        body.checksum.clear();
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        let mut hasher = SipHasher13::new();
        hasher.write(&bytes);
        format!("{:016x}", hasher.finish())
    }

    /// Validate the checkpoint's integrity
    pub fn validate(&self) -> StateResult<()> {
        let calculated = self.calculate_checksum();
        if calculated != self.checksum {
            return Err(StateError::RestoreFailed {
                pipeline: self.pipeline_id.clone(),
                reason: format!(
                    "checksum mismatch: expected {}, got {}",
                    self.checksum, calculated
                ),
            });
        }
        Ok(())
    }

    /// Whether two checkpoints record the same progress
    pub fn same_progress(&self, other: &Checkpoint) -> bool {
        self.pipeline_id == other.pipeline_id
            && self.next_batch_id == other.next_batch_id
            && self.source_offsets == other.source_offsets
            && self.source_high == other.source_high
            && self.sealed_through == other.sealed_through
            && self.last_window_end == other.last_window_end
    }
}

/// Durable storage for pipeline checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync + std::fmt::Debug {
    /// Latest checkpoint of a pipeline, `None` if it never committed
    async fn load(&self, pipeline_id: &str) -> StateResult<Option<Checkpoint>>;

    /// Atomically replace the checkpoint of a pipeline
    async fn commit(&self, pipeline_id: &str, checkpoint: &Checkpoint) -> StateResult<()>;

    /// Every stored checkpoint, sorted by pipeline id
    async fn list(&self) -> StateResult<Vec<Checkpoint>>;
}

/// Checkpoints held in process memory
///
/// Commits can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    fail_commits: AtomicBool,
    commit_count: AtomicU64,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail (or succeed again)
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u64 {
        self.commit_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, pipeline_id: &str) -> StateResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(pipeline_id).cloned())
    }

    async fn commit(&self, pipeline_id: &str, checkpoint: &Checkpoint) -> StateResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StateError::StorageError {
                backend_type: "memory".to_string(),
                details: "commit failure injected".to_string(),
            });
        }
        self.checkpoints
            .write()
            .insert(pipeline_id.to_string(), checkpoint.clone());
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> StateResult<Vec<Checkpoint>> {
        let mut checkpoints: Vec<Checkpoint> = self.checkpoints.read().values().cloned().collect();
        checkpoints.sort_by(|a, b| a.pipeline_id.cmp(&b.pipeline_id));
        Ok(checkpoints)
    }
}

/// One JSON document per pipeline in a directory
///
/// Writes go to a temporary file that is then renamed over the previous
/// checkpoint, so a crash leaves either the old or the new document.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, pipeline_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", pipeline_id, CHECKPOINT_SUFFIX))
    }

    fn storage_error(&self, action: &str, err: std::io::Error) -> StateError {
        StateError::StorageError {
            backend_type: "file".to_string(),
            details: format!("failed to {} in {}: {}", action, self.dir.display(), err),
        }
    }

    async fn read(&self, path: &Path, pipeline_id: &str) -> StateResult<Checkpoint> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| self.storage_error("read checkpoint", e))?;

        let checkpoint: Checkpoint =
            serde_json::from_slice(&data).map_err(|e| StateError::DeserializationFailed {
                key: pipeline_id.to_string(),
                reason: e.to_string(),
            })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, pipeline_id: &str) -> StateResult<Option<Checkpoint>> {
        let path = self.path_for(pipeline_id);
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| self.storage_error("stat checkpoint", e))?
        {
            return Ok(None);
        }

        let checkpoint = self.read(&path, pipeline_id).await?;
        debug!(pipeline = pipeline_id, path = %path.display(), "Loaded checkpoint");
        Ok(Some(checkpoint))
    }

    async fn commit(&self, pipeline_id: &str, checkpoint: &Checkpoint) -> StateResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.storage_error("create directory", e))?;

        let serialized =
            serde_json::to_vec_pretty(checkpoint).map_err(|e| StateError::SerializationFailed {
                key: pipeline_id.to_string(),
                reason: e.to_string(),
            })?;

        let path = self.path_for(pipeline_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &serialized)
            .await
            .map_err(|e| self.storage_error("write checkpoint", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| self.storage_error("replace checkpoint", e))?;

        debug!(
            pipeline = pipeline_id,
            batch_id = checkpoint.next_batch_id,
            bytes = serialized.len(),
            "Checkpoint written"
        );
        Ok(())
    }

    async fn list(&self) -> StateResult<Vec<Checkpoint>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.storage_error("list checkpoints", e)),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.storage_error("list checkpoints", e))?
        {
            let file_name = entry.file_name();
            let Some(pipeline_id) = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(CHECKPOINT_SUFFIX))
            else {
                continue;
            };
            checkpoints.push(self.read(&entry.path(), pipeline_id).await?);
        }

        checkpoints.sort_by(|a, b| a.pipeline_id.cmp(&b.pipeline_id));
        Ok(checkpoints)
    }
}

/// Statistics about checkpointing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointStats {
    /// Checkpoints written to the store
    pub commits: u64,
    /// Commits skipped because nothing changed
    pub skipped: u64,
    /// Failed commits
    pub failures: u64,
    /// Last successful commit
    pub last_commit_time: Option<DateTime<Utc>>,
}

/// Result of [`CheckpointManager::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Same progress as the last checkpoint; the store was not touched
    Unchanged,
}

/// Checkpoint access for one pipeline
#[derive(Debug)]
pub struct CheckpointManager {
    pipeline_id: String,
    store: Arc<dyn CheckpointStore>,
    last: Option<Checkpoint>,
    stats: CheckpointStats,
}

impl CheckpointManager {
    pub fn new(pipeline_id: impl Into<String>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            store,
            last: None,
            stats: CheckpointStats::default(),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Load the stored checkpoint; called once at startup
    pub async fn restore(&mut self) -> StateResult<Option<Checkpoint>> {
        let checkpoint = self.store.load(&self.pipeline_id).await.map_err(|e| {
            StateError::RestoreFailed {
                pipeline: self.pipeline_id.clone(),
                reason: e.to_string(),
            }
        })?;

        match &checkpoint {
            Some(checkpoint) => info!(
                pipeline = %self.pipeline_id,
                batch_id = checkpoint.next_batch_id,
                sealed_through = %checkpoint.sealed_through,
                resume = %checkpoint.source_offsets,
                "Restored checkpoint"
            ),
            None => info!(pipeline = %self.pipeline_id, "No checkpoint found, starting fresh"),
        }

        self.last = checkpoint.clone();
        Ok(checkpoint)
    }

    /// Commit `next` unless it records the same progress as the last one
    ///
    /// Fails with [`StateError::Regression`] if the sealed-through watermark
    /// or the batch id would move backwards.
    pub async fn commit(&mut self, next: Checkpoint) -> StateResult<CommitOutcome> {
        if let Some(last) = &self.last {
            if last.same_progress(&next) {
                self.stats.skipped += 1;
                return Ok(CommitOutcome::Unchanged);
            }
            if next.sealed_through < last.sealed_through || next.next_batch_id < last.next_batch_id
            {
                self.stats.failures += 1;
                return Err(StateError::Regression {
                    pipeline: self.pipeline_id.clone(),
                    reason: format!(
                        "batch {} sealed through {} is behind batch {} sealed through {}",
                        next.next_batch_id,
                        next.sealed_through,
                        last.next_batch_id,
                        last.sealed_through
                    ),
                });
            }
        }

        if let Err(e) = self.store.commit(&self.pipeline_id, &next).await {
            self.stats.failures += 1;
            return Err(StateError::CheckpointFailed {
                pipeline: self.pipeline_id.clone(),
                reason: e.to_string(),
            });
        }

        self.stats.commits += 1;
        self.stats.last_commit_time = Some(next.committed_at);
        self.last = Some(next);
        Ok(CommitOutcome::Committed)
    }

    /// Last checkpoint restored or committed
    pub fn last(&self) -> Option<&Checkpoint> {
        self.last.as_ref()
    }

    pub fn stats(&self) -> &CheckpointStats {
        &self.stats
    }
}

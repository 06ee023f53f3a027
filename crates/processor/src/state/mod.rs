//! State management for the KPI engine
//!
//! Two kinds of state live here:
//!
//! - **Aggregate store**: the open partial aggregates of one pipeline, keyed
//!   by window and group, held in memory only
//! - **Checkpoints**: the durable progress of each pipeline, used to resume
//!   after a restart by replaying the source
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use processor::state::{CheckpointManager, FileCheckpointStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(FileCheckpointStore::new("checkpoints"));
//!     let mut manager = CheckpointManager::new("time_wise_kpi", store);
//!
//!     if let Some(checkpoint) = manager.restore().await? {
//!         println!("resuming from {}", checkpoint.source_offsets);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate_store;
pub mod checkpoint;

pub use aggregate_store::{AggregateKey, AggregateStore, EntryState, MergeOutcome};
pub use checkpoint::{
    Checkpoint, CheckpointManager, CheckpointStats, CheckpointStore, CommitOutcome,
    FileCheckpointStore, InMemoryCheckpointStore,
};

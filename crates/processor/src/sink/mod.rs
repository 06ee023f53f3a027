//! Output sinks
//!
//! A [`SinkWriter`] receives each batch once it is ready, tagged with a batch
//! id. A batch whose write fails is offered again with the same id, so
//! writers that key their output by batch id stay duplicate-free.
//!
//! - [`ConsoleSink`]: Spark-style batch tables on stdout
//! - [`JsonDirectorySink`]: one JSON-lines file per batch
//! - [`MemorySink`]: collects batches in memory

pub mod console;
pub mod json_dir;
pub mod memory;

pub use console::{render_batch, ConsoleSink};
pub use json_dir::JsonDirectorySink;
pub use memory::MemorySink;

use crate::error::SinkResult;
use async_trait::async_trait;
use sales_kpi_types::{format_time, AggregateRecord, EnrichedEvent};
use serde::Serialize;

/// A row that sinks know how to render
pub trait OutputRow: Serialize + Clone + Send + Sync + 'static {
    /// Column names in output order
    fn column_names(&self) -> Vec<String>;

    /// Rendered values, aligned with [`column_names`](Self::column_names)
    fn column_values(&self) -> Vec<String>;
}

impl OutputRow for AggregateRecord {
    fn column_names(&self) -> Vec<String> {
        AggregateRecord::column_names(self)
    }

    fn column_values(&self) -> Vec<String> {
        AggregateRecord::column_values(self)
    }
}

const ENRICHED_COLUMNS: [&str; 8] = [
    "invoice_no",
    "country",
    "timestamp",
    "type",
    "total_items",
    "total_cost",
    "is_order",
    "is_return",
];

impl OutputRow for EnrichedEvent {
    fn column_names(&self) -> Vec<String> {
        ENRICHED_COLUMNS.iter().map(|name| name.to_string()).collect()
    }

    fn column_values(&self) -> Vec<String> {
        vec![
            self.invoice_no().to_string(),
            self.country().to_string(),
            format_time(&self.timestamp()),
            self.event_type().to_string(),
            self.total_items.to_string(),
            self.total_cost.to_string(),
            self.is_order.to_string(),
            self.is_return.to_string(),
        ]
    }
}

/// Destination for batches of rows
#[async_trait]
pub trait SinkWriter<R: OutputRow>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Write one batch
    ///
    /// Called again with the same `batch_id` and rows (plus possibly more
    /// rows) if a previous attempt failed.
    async fn write(&self, batch_id: u64, rows: &[R]) -> SinkResult<()>;
}

#[async_trait]
impl<R: OutputRow> SinkWriter<R> for Box<dyn SinkWriter<R>> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write(&self, batch_id: u64, rows: &[R]) -> SinkResult<()> {
        (**self).write(batch_id, rows).await
    }
}

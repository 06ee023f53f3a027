//! Console sink
//!
//! Prints each batch as a table in the layout of Spark's console sink:
//!
//! ```text
//! -------------------------------------------
//! Batch: 3
//! -------------------------------------------
//! +------------------------+------------------------+---------------------+
//! |start                   |end                     |total_volume_of_sales|
//! +------------------------+------------------------+---------------------+
//! |2020-11-20T05:37:00.000Z|2020-11-20T05:38:00.000Z|70                   |
//! +------------------------+------------------------+---------------------+
//! ```
//!
//! With `truncate` enabled, cells longer than 20 characters are cut and
//! values are right-aligned; otherwise they are left-aligned in full.

use super::{OutputRow, SinkWriter};
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;

const TRUNCATE_WIDTH: usize = 20;

/// Sink printing batch tables
pub struct ConsoleSink {
    name: String,
    truncate: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Print to stdout
    pub fn stdout(name: impl Into<String>, truncate: bool) -> Self {
        Self::with_writer(name, truncate, Box::new(std::io::stdout()))
    }

    /// Print to any writer
    pub fn with_writer(name: impl Into<String>, truncate: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            truncate,
            out: Mutex::new(out),
        }
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("name", &self.name)
            .field("truncate", &self.truncate)
            .finish_non_exhaustive()
    }
}

fn cell(value: &str, truncate: bool) -> String {
    if truncate && value.chars().count() > TRUNCATE_WIDTH {
        let kept: String = value.chars().take(TRUNCATE_WIDTH - 3).collect();
        format!("{}...", kept)
    } else {
        value.to_string()
    }
}

/// Render one batch as a table
pub fn render_batch<R: OutputRow>(batch_id: u64, rows: &[R], truncate: bool) -> String {
    let separator = "-------------------------------------------";
    let mut out = format!("{}\nBatch: {}\n{}\n", separator, batch_id, separator);

    let Some(first) = rows.first() else {
        out.push_str("++\n||\n++\n++\n\n");
        return out;
    };

    let header: Vec<String> = first
        .column_names()
        .iter()
        .map(|name| cell(name, truncate))
        .collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.column_values()
                .iter()
                .map(|value| cell(value, truncate))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|name| name.chars().count().max(3)).collect();
    for row in &body {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let border: String = widths.iter().fold(String::from("+"), |mut acc, width| {
        acc.push_str(&"-".repeat(*width));
        acc.push('+');
        acc
    });
    let line = |values: &[String]| {
        let mut line = String::from("|");
        for (value, width) in values.iter().zip(&widths) {
            if truncate {
                line.push_str(&format!("{:>width$}|", value, width = *width));
            } else {
                line.push_str(&format!("{:<width$}|", value, width = *width));
            }
        }
        line
    };

    out.push_str(&border);
    out.push('\n');
    out.push_str(&line(&header));
    out.push('\n');
    out.push_str(&border);
    out.push('\n');
    for row in &body {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&border);
    out.push_str("\n\n");
    out
}

#[async_trait]
impl<R: OutputRow> SinkWriter<R> for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, batch_id: u64, rows: &[R]) -> SinkResult<()> {
        let table = render_batch(batch_id, rows, self.truncate);
        let mut out = self.out.lock();
        out.write_all(table.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|source| SinkError::Io {
                sink: self.name.clone(),
                source,
            })
    }
}

//! JSON directory sink
//!
//! Each batch becomes `part-NNNNN.json` in the output directory with one JSON
//! object per line. Files are written to a temporary name and renamed into
//! place, so a batch retried under the same id replaces its earlier file.

use super::{OutputRow, SinkWriter};
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sink writing JSON-lines files, one per batch
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    name: String,
    dir: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(name: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `batch_id`
    pub fn batch_path(&self, batch_id: u64) -> PathBuf {
        self.dir.join(format!("part-{:05}.json", batch_id))
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            sink: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl<R: OutputRow> SinkWriter<R> for JsonDirectorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, batch_id: u64, rows: &[R]) -> SinkResult<()> {
        let mut body = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut body, row).map_err(|e| SinkError::Encoding {
                sink: self.name.clone(),
                reason: e.to_string(),
            })?;
            body.push(b'\n');
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error(e))?;

        let path = self.batch_path(batch_id);
        let tmp = self.dir.join(format!(".part-{:05}.json.tmp", batch_id));
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(
            sink = %self.name,
            batch_id,
            rows = rows.len(),
            path = %path.display(),
            "Wrote batch file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sales_kpi_types::{AggregateRecord, MetricColumn, MetricValue};

    fn record(minute: u32, total: f64) -> AggregateRecord {
        AggregateRecord {
            start: Utc.with_ymd_and_hms(2020, 11, 20, 5, minute, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 11, 20, 5, minute + 1, 0).unwrap(),
            group: None,
            metrics: vec![MetricColumn {
                name: "total_volume_of_sales".to_string(),
                value: MetricValue::Float(total),
            }],
        }
    }

    #[tokio::test]
    async fn test_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::new("time_wise_kpi", dir.path().join("out"));

        sink.write(0, &[record(37, 70.0), record(38, 12.5)])
            .await
            .unwrap();

        let text = std::fs::read_to_string(sink.batch_path(0)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"start":"2020-11-20T05:37:00.000Z","end":"2020-11-20T05:38:00.000Z","total_volume_of_sales":70.0}"#
        );
        assert!(sink.batch_path(0).ends_with("part-00000.json"));
    }

    #[tokio::test]
    async fn test_retry_overwrites_same_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::new("kpi", dir.path());

        sink.write(3, &[record(1, 1.0)]).await.unwrap();
        sink.write(3, &[record(1, 1.0), record(2, 2.0)]).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["part-00003.json".to_string()]);

        let text = std::fs::read_to_string(sink.batch_path(3)).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

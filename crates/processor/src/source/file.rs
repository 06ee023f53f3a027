//! Newline-delimited JSON file source
//!
//! Every line is one payload on partition 0; the offset is the zero-based
//! line number, so blank lines still consume an offset.

use super::{MessageSource, SourceMessage, SourceOffsets};
use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

const PARTITION: i32 = 0;

/// Source reading a bounded NDJSON file
#[derive(Debug)]
pub struct FileSource {
    id: String,
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    next_offset: i64,
    skip_to: i64,
    exhausted: bool,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            id: format!("file:{}", path.display()),
            path,
            lines: None,
            next_offset: 0,
            skip_to: 0,
            exhausted: false,
        }
    }

    async fn open(&mut self) -> SourceResult<()> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable {
                source_id: self.id.clone(),
                reason: e.to_string(),
            })?;
        info!(path = %self.path.display(), "Opened input file");
        self.lines = Some(BufReader::new(file).lines());
        self.next_offset = 0;
        Ok(())
    }

    async fn read_next(&mut self) -> SourceResult<Option<SourceMessage>> {
        if self.lines.is_none() {
            self.open().await?;
        }

        loop {
            let line = match self.lines.as_mut() {
                Some(lines) => lines.next_line().await.map_err(|e| SourceError::Unavailable {
                    source_id: self.id.clone(),
                    reason: e.to_string(),
                })?,
                None => None,
            };

            let Some(line) = line else {
                if !self.exhausted {
                    debug!(path = %self.path.display(), lines = self.next_offset, "Reached end of file");
                }
                self.exhausted = true;
                return Ok(None);
            };

            let offset = self.next_offset;
            self.next_offset += 1;
            if offset < self.skip_to || line.trim().is_empty() {
                continue;
            }

            return Ok(Some(SourceMessage {
                partition: PARTITION,
                offset,
                payload: line.into_bytes(),
            }));
        }
    }
}

#[async_trait]
impl MessageSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn poll(&mut self, timeout: Duration) -> SourceResult<Option<SourceMessage>> {
        if self.exhausted {
            return Ok(None);
        }
        match tokio::time::timeout(timeout, self.read_next()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    async fn seek(&mut self, offsets: &SourceOffsets) -> SourceResult<()> {
        self.skip_to = offsets.get(PARTITION).unwrap_or(0).max(0);
        self.lines = None;
        self.exhausted = false;
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

//! Dump sinks.
//!
//! A [`DumpSink`] receives the header once, then every change record in
//! feed order. The single-file implementation here streams records straight
//! to the output file (or stdout) through a buffered writer; the split
//! implementation lives in the sibling `split` module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter, Stdout};
use tracing::debug;

use crate::error::{Result, WriteError};
use crate::record::{ChangeRecord, DumpHeader};

/// Destination for a dump stream.
#[async_trait]
pub trait DumpSink: Send {
    /// Write the header record. Called exactly once, before any change
    /// record.
    async fn begin(&mut self, header: &DumpHeader) -> Result<()>;

    /// Write one change record, in feed order.
    async fn write_record(&mut self, record: &ChangeRecord) -> Result<()>;

    /// Flush everything and wait for all outstanding file finalizations.
    ///
    /// Returns the number of output files written.
    async fn finish(&mut self) -> Result<u64>;

    /// Stop without emitting further output, but wait for finalizations
    /// already in flight so completed files are not left corrupt.
    async fn abort(&mut self);
}

const WRITE_BUFFER_SIZE: usize = 8 * 1024 * 1024;

enum Target {
    File { path: PathBuf, writer: BufWriter<File> },
    Stdout(BufWriter<Stdout>),
}

/// Single-file sink: header then records, streamed to one destination.
pub struct FileSink {
    target: Target,
    written: u64,
}

impl FileSink {
    /// Open the destination. `None` streams to stdout.
    pub async fn create(path: Option<&Path>) -> Result<Self> {
        let target = match path {
            Some(path) => {
                let file = File::create(path).await.map_err(|e| WriteError::Create {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                debug!("Created dump file: {}", path.display());
                Target::File {
                    path: path.to_path_buf(),
                    writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
                }
            }
            None => Target::Stdout(BufWriter::new(tokio::io::stdout())),
        };

        Ok(Self { target, written: 0 })
    }

    fn destination(&self) -> String {
        match &self.target {
            Target::File { path, .. } => path.display().to_string(),
            Target::Stdout(_) => "<stdout>".to_string(),
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let result = async {
            let writer: &mut (dyn tokio::io::AsyncWrite + Unpin + Send) = match &mut self.target {
                Target::File { writer, .. } => writer,
                Target::Stdout(writer) => writer,
            };
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            std::io::Result::Ok(())
        }
        .await;

        result.map_err(|e| {
            WriteError::Write {
                path: self.destination(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl DumpSink for FileSink {
    async fn begin(&mut self, header: &DumpHeader) -> Result<()> {
        self.write_line(header.as_line()).await
    }

    async fn write_record(&mut self, record: &ChangeRecord) -> Result<()> {
        self.write_line(record.as_line()).await?;
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        let flush = match &mut self.target {
            Target::File { writer, .. } => writer.flush().await,
            Target::Stdout(writer) => writer.flush().await,
        };
        flush.map_err(|e| WriteError::Write {
            path: self.destination(),
            reason: e.to_string(),
        })?;

        debug!(
            "Finalized dump to {} ({} records)",
            self.destination(),
            self.written
        );
        Ok(1)
    }

    async fn abort(&mut self) {
        // Best effort: whatever reached the buffer is flushed so the
        // partial output stays line-aligned.
        let _ = match &mut self.target {
            Target::File { writer, .. } => writer.flush().await,
            Target::Stdout(writer) => writer.flush().await,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_sink_header_first_then_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.txt");

        let header = DumpHeader::new("local", json!({"db_name": "t", "update_seq": 2})).unwrap();
        let mut sink = FileSink::create(Some(&path)).await.unwrap();
        sink.begin(&header).await.unwrap();
        sink.write_record(&ChangeRecord::new(Some(1), vec![json!({"_id": "a"})]).unwrap())
            .await
            .unwrap();
        sink.write_record(&ChangeRecord::new(Some(2), vec![json!({"_id": "b"})]).unwrap())
            .await
            .unwrap();
        assert_eq!(sink.finish().await.unwrap(), 1);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], header.as_line());
    }

    #[tokio::test]
    async fn test_file_sink_unwritable_path() {
        let result = FileSink::create(Some(Path::new("/nonexistent/dir/dump.txt"))).await;
        assert!(result.is_err());
    }
}

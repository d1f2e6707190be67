//! Split sink: re-chunk the dump stream into bounded-size files.
//!
//! Records accumulate in memory until their document count reaches the
//! split threshold, then the file is finalized — header line first, then
//! the buffered records — by a background task while the next file's
//! records keep accumulating. The coordinator waits for every outstanding
//! finalization before declaring the export successful, so a completed run
//! never leaves a torn file behind.
//!
//! Each split file starts with a byte-identical copy of the dump header,
//! making every file independently a valid, replayable dump fragment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DumpError, Result, WriteError};
use crate::record::{ChangeRecord, DumpHeader};

use super::writer::DumpSink;

const WRITE_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Derive the path of the `index`-th split file from the base output path.
///
/// An 8-digit zero-padded index goes before the extension when there is
/// one, otherwise onto the end: `dump.txt` becomes `dump_00000002.txt`,
/// `dump` becomes `dump_00000000`.
pub fn split_file_name(base: &Path, index: u64) -> PathBuf {
    let num = format!("{index:08}");
    match (base.file_stem(), base.extension()) {
        (Some(stem), Some(ext)) => base.with_file_name(format!(
            "{}_{}.{}",
            stem.to_string_lossy(),
            num,
            ext.to_string_lossy()
        )),
        _ => {
            let name = base
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            base.with_file_name(format!("{name}_{num}"))
        }
    }
}

/// Sink that partitions the record stream into split files.
pub struct SplitSink {
    base_path: PathBuf,
    threshold: u64,
    header_line: String,
    buffer: Vec<String>,
    docs_in_file: u64,
    file_index: u64,
    pending: Vec<JoinHandle<Result<()>>>,
}

impl SplitSink {
    /// Create a split sink writing files derived from `base_path`, rolling
    /// over every `threshold` documents.
    pub fn new(base_path: PathBuf, threshold: u64) -> Self {
        Self {
            base_path,
            threshold,
            header_line: String::new(),
            buffer: Vec::new(),
            docs_in_file: 0,
            file_index: 0,
            pending: Vec::new(),
        }
    }

    /// Finalize the current file in the background and start a new one.
    ///
    /// The buffered records are moved into the writer task, so the next
    /// file's records accumulate into fresh, disjoint state while this
    /// file's write/close completes.
    fn roll(&mut self) {
        let path = split_file_name(&self.base_path, self.file_index);
        let header = self.header_line.clone();
        let lines = std::mem::take(&mut self.buffer);

        debug!(
            "Finalizing split file {} ({} records, {} docs)",
            path.display(),
            lines.len(),
            self.docs_in_file
        );

        self.file_index += 1;
        self.docs_in_file = 0;
        self.pending
            .push(tokio::spawn(write_split_file(path, header, lines)));
    }

    /// Await every outstanding finalization, keeping the first error.
    ///
    /// All handles are joined even after a failure so files whose writes
    /// already completed are not abandoned mid-close.
    async fn drain_pending(&mut self) -> Result<()> {
        let mut first_err: Option<DumpError> = None;
        for joined in future::join_all(self.pending.drain(..)).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(WriteError::TaskFailed(e.to_string()).into());
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn write_split_file(path: PathBuf, header: String, lines: Vec<String>) -> Result<()> {
    let create_err = |e: std::io::Error| WriteError::Create {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let write_err = |e: std::io::Error| WriteError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let file = File::create(&path).await.map_err(create_err)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    writer.write_all(header.as_bytes()).await.map_err(write_err)?;
    writer.write_all(b"\n").await.map_err(write_err)?;
    for line in &lines {
        writer.write_all(line.as_bytes()).await.map_err(write_err)?;
        writer.write_all(b"\n").await.map_err(write_err)?;
    }
    writer.flush().await.map_err(write_err)?;

    debug!("Closed split file {}", path.display());
    Ok(())
}

#[async_trait]
impl DumpSink for SplitSink {
    async fn begin(&mut self, header: &DumpHeader) -> Result<()> {
        self.header_line = header.as_line().to_string();
        Ok(())
    }

    async fn write_record(&mut self, record: &ChangeRecord) -> Result<()> {
        self.buffer.push(record.as_line().to_string());
        self.docs_in_file += record.doc_count() as u64;

        if self.docs_in_file >= self.threshold {
            self.roll();
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        // The final file may carry fewer documents than the threshold, but
        // an empty file is never emitted.
        if !self.buffer.is_empty() {
            self.roll();
        } else if self.file_index == 0 {
            // Empty database: the dump is still one file with the header.
            self.roll();
        }

        self.drain_pending().await?;
        Ok(self.file_index)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
        self.docs_in_file = 0;
        if let Err(e) = self.drain_pending().await {
            warn!("Split file finalization failed during abort: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(seq: u64, docs: usize) -> ChangeRecord {
        let docs: Vec<Value> = (0..docs)
            .map(|i| json!({"_id": format!("doc-{seq}-{i}")}))
            .collect();
        ChangeRecord::new(Some(seq), docs).unwrap()
    }

    fn header() -> DumpHeader {
        DumpHeader::new("local", json!({"db_name": "t", "update_seq": 250})).unwrap()
    }

    #[test]
    fn test_split_file_name_with_extension() {
        assert_eq!(
            split_file_name(Path::new("dump.txt"), 2),
            PathBuf::from("dump_00000002.txt")
        );
        assert_eq!(
            split_file_name(Path::new("out/dump.txt"), 0),
            PathBuf::from("out/dump_00000000.txt")
        );
    }

    #[test]
    fn test_split_file_name_without_extension() {
        assert_eq!(
            split_file_name(Path::new("dump"), 0),
            PathBuf::from("dump_00000000")
        );
        assert_eq!(
            split_file_name(Path::new("out/dump"), 11),
            PathBuf::from("out/dump_00000011")
        );
    }

    async fn read_lines(path: &Path) -> Vec<String> {
        tokio::fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[tokio::test]
    async fn test_250_docs_threshold_100_gives_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dump.txt");
        let header = header();

        let mut sink = SplitSink::new(base.clone(), 100);
        sink.begin(&header).await.unwrap();
        // 25 batches of 10 documents.
        for i in 0..25 {
            sink.write_record(&record(i * 10 + 10, 10)).await.unwrap();
        }
        let files = sink.finish().await.unwrap();
        assert_eq!(files, 3);

        let mut total_docs = 0usize;
        for index in 0..3 {
            let lines = read_lines(&split_file_name(&base, index)).await;
            // Every file begins with a byte-identical header.
            assert_eq!(lines[0], header.as_line());

            let docs: usize = lines[1..]
                .iter()
                .map(|l| ChangeRecord::parse(l).unwrap().doc_count())
                .sum();
            if index < 2 {
                assert!(docs >= 100, "file {index} rolled over early at {docs} docs");
            }
            total_docs += docs;
        }
        assert_eq!(total_docs, 250);
        assert!(!split_file_name(&base, 3).exists());
    }

    #[tokio::test]
    async fn test_threshold_overshoot_rolls_at_batch_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dump.txt");

        let mut sink = SplitSink::new(base.clone(), 10);
        sink.begin(&header()).await.unwrap();
        // 7 + 7 = 14 >= 10: both batches land in file 0.
        sink.write_record(&record(7, 7)).await.unwrap();
        sink.write_record(&record(14, 7)).await.unwrap();
        sink.write_record(&record(16, 2)).await.unwrap();
        let files = sink.finish().await.unwrap();
        assert_eq!(files, 2);

        let first = read_lines(&split_file_name(&base, 0)).await;
        let docs: usize = first[1..]
            .iter()
            .map(|l| ChangeRecord::parse(l).unwrap().doc_count())
            .sum();
        assert_eq!(docs, 14);
    }

    #[tokio::test]
    async fn test_exact_threshold_leaves_no_trailing_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dump.txt");

        let mut sink = SplitSink::new(base.clone(), 10);
        sink.begin(&header()).await.unwrap();
        sink.write_record(&record(10, 10)).await.unwrap();
        sink.write_record(&record(20, 10)).await.unwrap();
        let files = sink.finish().await.unwrap();

        assert_eq!(files, 2);
        assert!(!split_file_name(&base, 2).exists());
    }

    #[tokio::test]
    async fn test_empty_stream_emits_single_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dump.txt");
        let header = header();

        let mut sink = SplitSink::new(base.clone(), 100);
        sink.begin(&header).await.unwrap();
        let files = sink.finish().await.unwrap();
        assert_eq!(files, 1);

        let lines = read_lines(&split_file_name(&base, 0)).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], header.as_line());
    }

    #[tokio::test]
    async fn test_unwritable_directory_fails_on_finish() {
        let mut sink = SplitSink::new(PathBuf::from("/nonexistent/dir/dump.txt"), 10);
        sink.begin(&header()).await.unwrap();
        sink.write_record(&record(10, 10)).await.unwrap();
        assert!(sink.finish().await.is_err());
    }
}

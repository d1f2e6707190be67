//! Local on-disk source databases.
//!
//! A local store is a directory owned by an embedded database engine. The
//! engine itself is a collaborator; this adapter only reads the two pieces
//! of its on-disk contract:
//!
//! - `db_info.json` — database metadata, including `update_seq`
//! - `changes.ndjson` — the append-only change log, one JSON entry per
//!   document change (`{"seq": ..., "doc": {...}}`)
//!
//! The adapter regroups individual log entries into batch-sized change
//! records; grouping never affects which documents are exported or their
//! order.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::record::{parse_seq, ChangeRecord, DumpHeader};

use super::{ChangeFeed, Source};

const DB_INFO_FILE: &str = "db_info.json";
const CHANGES_FILE: &str = "changes.ndjson";

/// A database directory on the local filesystem.
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Source for LocalSource {
    async fn probe(&self) -> Result<()> {
        let exists = tokio::fs::try_exists(&self.path).await?;
        if exists {
            Ok(())
        } else {
            Err(SourceError::NotFound(self.path.display().to_string()).into())
        }
    }

    async fn export(&self, batch_size: usize) -> Result<Box<dyn ChangeFeed>> {
        let info_path = self.path.join(DB_INFO_FILE);
        let raw_info = tokio::fs::read_to_string(&info_path).await.map_err(|e| {
            SourceError::Feed(format!("cannot read {}: {e}", info_path.display()))
        })?;
        let db_info: Value = serde_json::from_str(&raw_info).map_err(|e| {
            SourceError::Feed(format!("malformed {}: {e}", info_path.display()))
        })?;

        let header = DumpHeader::new("local", db_info)?;
        info!(
            "Starting export of {} ({} sequences)",
            self.path.display(),
            header.update_seq()
        );

        // A store that has never seen a write may have no change log yet;
        // that is an empty database, not an error.
        let changes_path = self.path.join(CHANGES_FILE);
        let lines = match File::open(&changes_path).await {
            Ok(file) => Some(BufReader::new(file).lines()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(SourceError::Feed(format!(
                    "cannot read {}: {e}",
                    changes_path.display()
                ))
                .into());
            }
        };

        Ok(Box::new(LocalFeed {
            header,
            lines,
            batch_size,
            emitted: 0,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    seq: Option<Value>,
    #[serde(default)]
    doc: Option<Value>,
}

struct LocalFeed {
    header: DumpHeader,
    lines: Option<Lines<BufReader<File>>>,
    batch_size: usize,
    emitted: u64,
}

#[async_trait]
impl ChangeFeed for LocalFeed {
    fn header(&self) -> &DumpHeader {
        &self.header
    }

    async fn next_record(&mut self) -> Result<Option<ChangeRecord>> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        let mut docs = Vec::with_capacity(self.batch_size);
        let mut last_seq: Option<Value> = None;

        while docs.len() < self.batch_size {
            let line = lines
                .next_line()
                .await
                .map_err(|e| SourceError::Feed(format!("change log read failed: {e}")))?;
            let Some(line) = line else {
                self.lines = None;
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let entry: LogEntry = serde_json::from_str(&line)
                .map_err(|e| SourceError::Feed(format!("malformed change log entry: {e}")))?;
            if entry.seq.is_some() {
                last_seq = entry.seq;
            }
            if let Some(doc) = entry.doc {
                docs.push(doc);
            }
        }

        if docs.is_empty() && last_seq.is_none() {
            debug!("Change log exhausted after {} documents", self.emitted);
            return Ok(None);
        }

        self.emitted += docs.len() as u64;
        let seq = last_seq.as_ref().and_then(parse_seq);
        Ok(Some(ChangeRecord::new(seq, docs)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    async fn write_store(dir: &Path, update_seq: u64, docs: usize) {
        tokio::fs::write(
            dir.join(DB_INFO_FILE),
            serde_json::to_string(&json!({"db_name": "testdb", "update_seq": update_seq}))
                .unwrap(),
        )
        .await
        .unwrap();

        let mut log = String::new();
        for i in 0..docs {
            log.push_str(
                &serde_json::to_string(&json!({
                    "seq": i + 1,
                    "doc": {"_id": format!("doc-{i}"), "value": i}
                }))
                .unwrap(),
            );
            log.push('\n');
        }
        tokio::fs::write(dir.join(CHANGES_FILE), log).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_missing_path_names_it() {
        let source = LocalSource::new(PathBuf::from("/nonexistent/store-xyz"));
        let err = source.probe().await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/store-xyz"));
    }

    #[tokio::test]
    async fn test_export_groups_by_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), 7, 7).await;

        let source = LocalSource::new(dir.path().to_path_buf());
        source.probe().await.unwrap();
        let mut feed = source.export(3).await.unwrap();
        assert_eq!(feed.header().update_seq(), 7);

        let mut counts = Vec::new();
        let mut seqs = Vec::new();
        while let Some(record) = feed.next_record().await.unwrap() {
            counts.push(record.doc_count());
            seqs.push(record.seq().unwrap());
        }
        assert_eq!(counts, vec![3, 3, 1]);
        // Batch seq is the last entry's seq, non-decreasing and bounded by
        // the header total.
        assert_eq!(seqs, vec![3, 6, 7]);
    }

    #[tokio::test]
    async fn test_export_empty_store_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(DB_INFO_FILE),
            r#"{"db_name":"empty","update_seq":0}"#,
        )
        .await
        .unwrap();

        let source = LocalSource::new(dir.path().to_path_buf());
        let mut feed = source.export(100).await.unwrap();
        assert_eq!(feed.header().update_seq(), 0);
        assert!(feed.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_order_is_log_order() {
        let dir = tempfile::tempdir().unwrap();
        write_store(dir.path(), 4, 4).await;

        let source = LocalSource::new(dir.path().to_path_buf());
        let mut feed = source.export(10).await.unwrap();

        let record = feed.next_record().await.unwrap().unwrap();
        let parsed: Value = serde_json::from_str(record.as_line()).unwrap();
        let ids: Vec<&str> = parsed["docs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["doc-0", "doc-1", "doc-2", "doc-3"]);
    }

    #[tokio::test]
    async fn test_malformed_log_entry_is_a_feed_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(DB_INFO_FILE),
            r#"{"db_name":"bad","update_seq":1}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join(CHANGES_FILE), "{broken\n").await.unwrap();

        let source = LocalSource::new(dir.path().to_path_buf());
        let mut feed = source.export(10).await.unwrap();
        assert!(feed.next_record().await.is_err());
    }
}

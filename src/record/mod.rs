//! Dump record model.
//!
//! A dump is a stream of newline-delimited JSON records: the first line is
//! a [`DumpHeader`] describing the database, every following line is a
//! [`ChangeRecord`] carrying one batch of documents from the change feed.
//!
//! Records are parsed only to read the handful of fields the pipeline
//! interprets (`db_info.update_seq`, `seq`, `docs`). The original line is
//! kept and relayed byte-for-byte, so revision trees, attachments, and any
//! other per-record metadata pass through the export unmodified.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SourceError};

/// Parse a sequence value from the forms CouchDB-style databases emit:
/// a plain JSON number, or a `"N-opaque"` string whose numeric prefix
/// carries the ordering.
pub fn parse_seq(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let digits = s.split('-').next().unwrap_or("");
            digits.parse().ok()
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct HeaderFields {
    #[serde(default)]
    db_info: Option<Value>,
}

/// The first record of an export stream.
///
/// Written verbatim as line 0 of every output file, including every split
/// file, so each split file is independently a valid header-prefixed dump
/// fragment.
#[derive(Debug, Clone)]
pub struct DumpHeader {
    raw: String,
    update_seq: u64,
}

impl DumpHeader {
    /// Build a header for a dump this tool originates.
    ///
    /// `db_info` is the database metadata object as reported by the source;
    /// its `update_seq` becomes the total sequence count used for progress.
    pub fn new(db_type: &str, db_info: Value) -> Result<Self> {
        let update_seq = db_info
            .get("update_seq")
            .and_then(parse_seq)
            .unwrap_or(0);

        #[derive(Serialize)]
        struct HeaderLine<'a> {
            version: &'a str,
            db_type: &'a str,
            start_time: String,
            db_info: Value,
        }

        let raw = serde_json::to_string(&HeaderLine {
            version: env!("CARGO_PKG_VERSION"),
            db_type,
            start_time: chrono::Utc::now().to_rfc3339(),
            db_info,
        })?;

        Ok(Self { raw, update_seq })
    }

    /// Parse a header line received from a source stream.
    ///
    /// A missing or zero `update_seq` is valid (empty database) and simply
    /// means the export is complete as soon as it starts.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: HeaderFields = serde_json::from_str(line)
            .map_err(|e| SourceError::BadHeader(e.to_string()))?;

        let update_seq = fields
            .db_info
            .as_ref()
            .and_then(|info| info.get("update_seq"))
            .and_then(parse_seq)
            .unwrap_or(0);

        Ok(Self {
            raw: line.to_string(),
            update_seq,
        })
    }

    /// Total update-sequence count at export start.
    pub fn update_seq(&self) -> u64 {
        self.update_seq
    }

    /// The header exactly as it appears on the wire.
    pub fn as_line(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Deserialize)]
struct ChangeFields {
    #[serde(default)]
    seq: Option<Value>,
    #[serde(default)]
    docs: Option<Vec<Value>>,
}

/// One batch of changes from the feed.
///
/// Only `seq` (export progress cursor, not present on every record) and the
/// document count are interpreted; everything else rides along in the raw
/// line.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    raw: String,
    seq: Option<u64>,
    doc_count: usize,
}

impl ChangeRecord {
    /// Build a change record for a batch this tool originates.
    pub fn new(seq: Option<u64>, docs: Vec<Value>) -> Result<Self> {
        #[derive(Serialize)]
        struct ChangeLine {
            #[serde(skip_serializing_if = "Option::is_none")]
            seq: Option<u64>,
            docs: Vec<Value>,
        }

        let doc_count = docs.len();
        let raw = serde_json::to_string(&ChangeLine { seq, docs })?;

        Ok(Self { raw, seq, doc_count })
    }

    /// Parse a change line received from a source stream.
    ///
    /// Lines without `seq` or `docs` are valid; they carry metadata that is
    /// relayed without advancing progress or document accounting.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: ChangeFields = serde_json::from_str(line)
            .map_err(|e| SourceError::Feed(format!("malformed change record: {e}")))?;

        Ok(Self {
            raw: line.to_string(),
            seq: fields.seq.as_ref().and_then(parse_seq),
            doc_count: fields.docs.map_or(0, |d| d.len()),
        })
    }

    /// Sequence cursor, when this record carries one.
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    /// Number of documents in this batch.
    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// The record exactly as it appears on the wire.
    pub fn as_line(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_seq_forms() {
        assert_eq!(parse_seq(&json!(42)), Some(42));
        assert_eq!(parse_seq(&json!("15-g1AAAAB")), Some(15));
        assert_eq!(parse_seq(&json!("1234")), Some(1234));
        assert_eq!(parse_seq(&json!(null)), None);
        assert_eq!(parse_seq(&json!("garbage")), None);
    }

    #[test]
    fn test_header_parse_extracts_update_seq() {
        let line = r#"{"version":"1.2.6","db_type":"http","start_time":"2016-01-01T00:00:00Z","db_info":{"db_name":"mydb","update_seq":250}}"#;
        let header = DumpHeader::parse(line).unwrap();
        assert_eq!(header.update_seq(), 250);
        assert_eq!(header.as_line(), line);
    }

    #[test]
    fn test_header_tolerates_missing_update_seq() {
        let header = DumpHeader::parse(r#"{"db_info":{"db_name":"empty"}}"#).unwrap();
        assert_eq!(header.update_seq(), 0);

        let header = DumpHeader::parse(r#"{"version":"1.0.0"}"#).unwrap();
        assert_eq!(header.update_seq(), 0);
    }

    #[test]
    fn test_header_rejects_non_json() {
        assert!(DumpHeader::parse("not json").is_err());
    }

    #[test]
    fn test_change_record_passthrough_is_byte_identical() {
        // Unknown fields and nested metadata must survive a decode/encode
        // round trip untouched.
        let line = r#"{"seq":7,"docs":[{"_id":"a","_rev":"1-x","_attachments":{"f":{"digest":"md5-0"}}}],"rev_tree":[{"pos":1}]}"#;
        let rec = ChangeRecord::parse(line).unwrap();
        assert_eq!(rec.as_line(), line);
        assert_eq!(rec.seq(), Some(7));
        assert_eq!(rec.doc_count(), 1);
    }

    #[test]
    fn test_change_record_without_seq_or_docs() {
        let rec = ChangeRecord::parse(r#"{"checkpoint":"abc"}"#).unwrap();
        assert_eq!(rec.seq(), None);
        assert_eq!(rec.doc_count(), 0);
    }

    #[test]
    fn test_change_record_string_seq() {
        let rec = ChangeRecord::parse(r#"{"seq":"33-g1AAAA","docs":[{},{}]}"#).unwrap();
        assert_eq!(rec.seq(), Some(33));
        assert_eq!(rec.doc_count(), 2);
    }

    #[test]
    fn test_new_change_record_serializes_once() {
        let rec = ChangeRecord::new(Some(9), vec![json!({"_id": "a"}), json!({"_id": "b"})]).unwrap();
        assert_eq!(rec.doc_count(), 2);
        assert_eq!(rec.seq(), Some(9));

        // The line we emit parses back to the same view.
        let reparsed = ChangeRecord::parse(rec.as_line()).unwrap();
        assert_eq!(reparsed.seq(), Some(9));
        assert_eq!(reparsed.doc_count(), 2);
        assert_eq!(reparsed.as_line(), rec.as_line());
    }

    #[test]
    fn test_new_header_carries_db_info() {
        let header =
            DumpHeader::new("http", json!({"db_name": "mydb", "update_seq": 100})).unwrap();
        assert_eq!(header.update_seq(), 100);

        let reparsed = DumpHeader::parse(header.as_line()).unwrap();
        assert_eq!(reparsed.update_seq(), 100);
    }
}

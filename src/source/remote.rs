//! HTTP-accessed source databases.
//!
//! Speaks the CouchDB-style REST surface: `GET {db}` for database metadata
//! (including `update_seq`, the total sequence count at export start) and
//! `GET {db}/_changes?include_docs=true` for the incremental feed, paged by
//! batch size with a `since` cursor.
//!
//! Authentication is transport-level only: credentials already live in the
//! URL authority (see the config layer) and an optional cookie rides along
//! as a default request header.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, SourceError};
use crate::record::{parse_seq, ChangeRecord, DumpHeader};

use super::{ChangeFeed, Source};

/// A remote database reachable over HTTP.
pub struct RemoteSource {
    url: Url,
    client: reqwest::Client,
    allow_unauthorized: bool,
}

impl RemoteSource {
    /// Create a remote source.
    ///
    /// # Arguments
    /// * `url` - Database URL, credentials already embedded if any
    /// * `cookie` - Raw cookie header attached to every request
    /// * `allow_unauthorized` - Treat a 401 probe response as reachable
    ///   (cookie validity is not re-checked by the probe)
    pub fn new(url: Url, cookie: Option<String>, allow_unauthorized: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| format!("Invalid cookie header: {e}"))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            url,
            client,
            allow_unauthorized,
        })
    }

    fn unavailable(&self, status: Option<u16>) -> SourceError {
        SourceError::Unavailable {
            identifier: self.url.to_string(),
            status,
        }
    }
}

#[async_trait]
impl Source for RemoteSource {
    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                debug!("Probe request failed: {e}");
                self.unavailable(None)
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Probe succeeded: {status}");
            Ok(())
        } else if status.as_u16() == 401 && self.allow_unauthorized {
            // Cookie auth cannot be verified here; assume it will hold for
            // the feed requests.
            debug!("Probe returned 401, proceeding with supplied auth");
            Ok(())
        } else {
            Err(self.unavailable(Some(status.as_u16())).into())
        }
    }

    async fn export(&self, batch_size: usize) -> Result<Box<dyn ChangeFeed>> {
        let db_info: Value = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Feed(format!("failed to fetch database info: {e}")))?
            .error_for_status()
            .map_err(|e| SourceError::Feed(format!("database info request failed: {e}")))?
            .json()
            .await
            .map_err(|e| SourceError::Feed(format!("malformed database info: {e}")))?;

        let header = DumpHeader::new("http", db_info)?;
        info!(
            "Starting export of {} ({} sequences)",
            self.url,
            header.update_seq()
        );

        Ok(Box::new(RemoteFeed {
            client: self.client.clone(),
            changes_url: changes_url(&self.url)?,
            header,
            batch_size,
            since: None,
            emitted: 0,
            done: false,
        }))
    }
}

/// Derive the `_changes` endpoint from a database URL.
fn changes_url(db_url: &Url) -> Result<Url> {
    let mut url = db_url.clone();
    url.path_segments_mut()
        .map_err(|_| SourceError::Feed("database URL cannot have a path".to_string()))?
        .pop_if_empty()
        .push("_changes");
    url.set_query(None);
    Ok(url)
}

/// The `since` cursor as it must be echoed back to the server.
///
/// String seqs are passed through whole; numeric seqs are rendered as
/// decimal.
fn since_param(seq: &Value) -> Option<String> {
    match seq {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ChangesPage {
    #[serde(default)]
    results: Vec<ChangeRow>,
    #[serde(default)]
    last_seq: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChangeRow {
    #[serde(default)]
    seq: Option<Value>,
    #[serde(default)]
    doc: Option<Value>,
}

struct RemoteFeed {
    client: reqwest::Client,
    changes_url: Url,
    header: DumpHeader,
    batch_size: usize,
    since: Option<String>,
    emitted: u64,
    done: bool,
}

impl RemoteFeed {
    async fn fetch_page(&self) -> Result<ChangesPage> {
        let mut url = self.changes_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("include_docs", "true")
                .append_pair("style", "all_docs")
                .append_pair("limit", &self.batch_size.to_string());
            if let Some(since) = &self.since {
                query.append_pair("since", since);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Feed(format!("changes request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SourceError::Feed(format!("changes request failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| SourceError::Feed(format!("malformed changes response: {e}")).into())
    }
}

#[async_trait]
impl ChangeFeed for RemoteFeed {
    fn header(&self) -> &DumpHeader {
        &self.header
    }

    async fn next_record(&mut self) -> Result<Option<ChangeRecord>> {
        if self.done {
            return Ok(None);
        }

        let page = self.fetch_page().await?;
        if page.results.is_empty() {
            debug!("Change feed exhausted after {} documents", self.emitted);
            self.done = true;
            return Ok(None);
        }

        if page.results.len() < self.batch_size {
            // Short page: the feed has caught up, stop after this record.
            self.done = true;
        }

        let batch_seq = page
            .last_seq
            .clone()
            .or_else(|| page.results.last().and_then(|row| row.seq.clone()));

        // Advance the cursor; a stuck cursor would loop forever.
        let next_since = batch_seq.as_ref().and_then(since_param);
        if next_since.is_none() || next_since == self.since {
            self.done = true;
        }
        if next_since.is_some() {
            self.since = next_since;
        }

        let docs: Vec<Value> = page.results.into_iter().filter_map(|row| row.doc).collect();
        self.emitted += docs.len() as u64;
        debug!(
            "Fetched change batch of {} documents (total: {})",
            docs.len(),
            self.emitted
        );

        let seq = batch_seq.as_ref().and_then(parse_seq);
        Ok(Some(ChangeRecord::new(seq, docs)?))
    }
}

//! Source database abstraction.
//!
//! The database engine and its transport are collaborators, not part of
//! this tool. A [`Source`] only has to answer three questions: does the
//! database exist, what does its metadata look like, and what is its
//! ordered change feed. Both adapters — HTTP-accessed databases and local
//! on-disk stores — implement the same pair of traits so the export
//! pipeline never knows which one it is draining.

use async_trait::async_trait;

use crate::config::{ExportConfig, SourceLocation};
use crate::error::Result;
use crate::record::{ChangeRecord, DumpHeader};

pub mod local;
pub mod remote;

pub use local::LocalSource;
pub use remote::RemoteSource;

/// A database that can be probed and exported.
#[async_trait]
pub trait Source: Send + Sync {
    /// Existence/reachability check.
    ///
    /// Runs before any output file is created; a failure here aborts the
    /// export with no partial work.
    async fn probe(&self) -> Result<()>;

    /// Start a full incremental export.
    ///
    /// `batch_size` controls how many documents the source groups per
    /// emitted record. It is a throughput/granularity knob only and must
    /// not affect which documents are exported or their order.
    async fn export(&self, batch_size: usize) -> Result<Box<dyn ChangeFeed>>;
}

/// An in-progress export: a header plus a lazy, ordered, finite sequence
/// of change records.
///
/// Records are pulled one at a time; `seq` values, when present, are
/// monotonically non-decreasing across the stream and bounded by the
/// header's total sequence count.
#[async_trait]
pub trait ChangeFeed: Send {
    /// The header record for this export.
    fn header(&self) -> &DumpHeader;

    /// Pull the next change record, or `None` when the feed is exhausted.
    async fn next_record(&mut self) -> Result<Option<ChangeRecord>>;
}

/// Construct the adapter matching the configured source location.
pub fn open(config: &ExportConfig) -> Result<Box<dyn Source>> {
    match &config.source {
        SourceLocation::Remote(url) => {
            // 401 responses are tolerated when alternate auth was supplied;
            // credential validity itself is not re-checked by the probe.
            let allow_unauthorized = config.cookie.is_some();
            let source = RemoteSource::new(url.clone(), config.cookie.clone(), allow_unauthorized)?;
            Ok(Box::new(source))
        }
        SourceLocation::Local(path) => Ok(Box::new(LocalSource::new(path.clone()))),
    }
}

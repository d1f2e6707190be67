//! Export coordinator.
//!
//! Wires the change feed into a dump sink, taps the optional observer, and
//! manages overall success/failure. Exactly one sink runs per export:
//! the single-file sink, or the split sink when a threshold was supplied.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::error::Result;
use crate::source::{self, ChangeFeed};

use super::progress::{ExportObserver, ProgressReporter};
use super::split::SplitSink;
use super::writer::{DumpSink, FileSink};
use super::batch_size_for;

/// Result of an export operation.
#[derive(Debug)]
pub struct ExportResult {
    /// Number of documents exported.
    pub documents_exported: u64,
    /// Number of output files written.
    pub files_written: u64,
    /// Time taken for the export.
    pub elapsed_ms: u64,
    /// Whether the export was cancelled before the feed drained.
    pub cancelled: bool,
}

/// Coordinator for a single export run.
pub struct ExportCoordinator {
    feed: Box<dyn ChangeFeed>,
    sink: Box<dyn DumpSink>,
    observer: Option<Box<dyn ExportObserver>>,
    cancel_token: Option<CancellationToken>,
}

impl ExportCoordinator {
    pub fn new(feed: Box<dyn ChangeFeed>, sink: Box<dyn DumpSink>) -> Self {
        Self {
            feed,
            sink,
            observer: None,
            cancel_token: None,
        }
    }

    /// Attach an observer tap (progress reporting).
    pub fn with_observer(mut self, observer: Box<dyn ExportObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set a cancellation token for this export.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Drive the feed to completion.
    ///
    /// The feed is consumed strictly sequentially; any feed or write error
    /// halts consumption, waits for file finalizations already in flight,
    /// and propagates. Output files fully finalized before the error stay
    /// on disk as valid partial dumps.
    pub async fn execute(mut self) -> Result<ExportResult> {
        let start_time = Instant::now();

        let header = self.feed.header().clone();
        if let Some(observer) = &mut self.observer {
            observer.on_header(&header);
        }
        if let Err(e) = self.sink.begin(&header).await {
            self.sink.abort().await;
            return Err(e);
        }

        let mut exported = 0u64;
        let mut batch_count = 0u32;
        let mut cancelled = false;

        loop {
            if let Some(token) = &self.cancel_token {
                if token.is_cancelled() {
                    info!("Export cancelled");
                    cancelled = true;
                    break;
                }
            }

            let record = match self.feed.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!("Change feed drained");
                    break;
                }
                Err(e) => {
                    self.finish_observer();
                    self.sink.abort().await;
                    return Err(e);
                }
            };

            if let Some(observer) = &mut self.observer {
                observer.on_record(&record);
            }

            if let Err(e) = self.sink.write_record(&record).await {
                self.finish_observer();
                self.sink.abort().await;
                return Err(e);
            }

            exported += record.doc_count() as u64;
            batch_count += 1;
            if batch_count % 10 == 0 {
                debug!("Progress: {exported} documents in {batch_count} batches");
            }
        }

        if cancelled {
            self.finish_observer();
            self.sink.abort().await;
            return Ok(ExportResult {
                documents_exported: exported,
                files_written: 0,
                elapsed_ms: start_time.elapsed().as_millis() as u64,
                cancelled: true,
            });
        }

        let files_written = self.sink.finish().await?;
        self.finish_observer();

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Export completed: {} documents, {} file(s), {} ms",
            exported, files_written, elapsed_ms
        );

        Ok(ExportResult {
            documents_exported: exported,
            files_written,
            elapsed_ms,
            cancelled: false,
        })
    }

    fn finish_observer(&mut self) {
        if let Some(observer) = &mut self.observer {
            observer.on_complete();
        }
    }
}

/// Run a full export for a validated configuration.
///
/// Probes the source, opens the change feed with the batch size matched to
/// the split threshold, routes to the single-file or split path, and
/// executes. No output file is created before the probe succeeds.
pub async fn run_export(
    config: &ExportConfig,
    cancel_token: Option<CancellationToken>,
) -> Result<ExportResult> {
    let source = source::open(config)?;
    source.probe().await?;

    let feed = source.export(batch_size_for(config.split)).await?;

    let sink: Box<dyn DumpSink> = match (config.split, &config.output) {
        (Some(threshold), Some(path)) => Box::new(SplitSink::new(path.clone(), threshold)),
        _ => Box::new(FileSink::create(config.output.as_deref()).await?),
    };

    let mut coordinator = ExportCoordinator::new(feed, sink);
    if !config.quiet {
        coordinator = coordinator.with_observer(Box::new(ProgressReporter::new(true)));
    }
    if let Some(token) = cancel_token {
        coordinator = coordinator.with_cancellation(token);
    }

    coordinator.execute().await
}

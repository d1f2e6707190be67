//! Progress reporting for export operations.
//!
//! The reporter is a tap on the record stream, never a gate: its whole API
//! is infallible, it draws to stderr so stdout dumps stay clean, and
//! detaching it changes nothing about the dump itself.

use indicatif::{ProgressBar, ProgressStyle};

use crate::record::{ChangeRecord, DumpHeader};

/// Observer interface the coordinator may attach to the record stream.
///
/// Implementations see the header once, then every change record in feed
/// order, strictly downstream of the write path.
pub trait ExportObserver: Send {
    /// The export stream's header, before any record.
    fn on_header(&mut self, header: &DumpHeader);

    /// One change record, in emission order.
    fn on_record(&mut self, record: &ChangeRecord);

    /// The stream ended (successfully or not).
    fn on_complete(&mut self);
}

/// Progress bar driven by `seq / total_seq`.
///
/// The total comes from the header's update-sequence count; each record's
/// `seq` advances the position. Records without a seq leave the bar where
/// it is. A total of zero (empty database) completes immediately — there
/// is no division anywhere to fault on.
pub struct ProgressReporter {
    enabled: bool,
    total: u64,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// Create a reporter.
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to render anything at all
    pub fn new(enable_bar: bool) -> Self {
        Self {
            enabled: enable_bar,
            total: 0,
            bar: None,
        }
    }
}

impl ExportObserver for ProgressReporter {
    fn on_header(&mut self, header: &DumpHeader) {
        if !self.enabled {
            return;
        }

        self.total = header.update_seq();
        let bar = ProgressBar::new(self.total);
        bar.set_style(
            ProgressStyle::with_template("Dumping [{bar:40}] {percent}% {eta}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        if self.total == 0 {
            bar.finish_and_clear();
        }
        self.bar = Some(bar);
    }

    fn on_record(&mut self, record: &ChangeRecord) {
        let Some(bar) = &self.bar else { return };
        // seq can briefly overshoot the total captured at export start when
        // the database keeps writing; clamp instead of overflowing the bar.
        if let Some(seq) = record.seq() {
            bar.set_position(seq.min(self.total));
        }
    }

    fn on_complete(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

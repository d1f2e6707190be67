//! Error handling module for couchdump.
//!
//! This module provides the crate-wide error taxonomy:
//! - Configuration errors, detected before any I/O happens
//! - Source errors from the database probe or the change feed
//! - Write errors from the output filesystem
//!
//! All failures are fatal; the tool never retries a failed probe, feed
//! batch, or file write. Output files that were fully finalized before an
//! error remain on disk as valid partial dumps.

pub mod kinds;

// Re-export commonly used types
pub use kinds::{ConfigError, DumpError, Result, SourceError, WriteError};

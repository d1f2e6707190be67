//! CouchDB-style database dump library
//!
//! This library provides the core functionality for couchdump, a tool that
//! streams the full contents of a document database into a line-delimited
//! JSON dump, optionally split into multiple files by document count.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Run configuration and validation
//! - `error`: Error types and handling
//! - `export`: The export pipeline (coordinator, sinks, progress)
//! - `record`: Dump record model (header and change records)
//! - `source`: Source database adapters (remote HTTP, local store)
//!
//! # Example
//!
//! ```no_run
//! use couchdump::config::ExportConfig;
//! use couchdump::export::run_export;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::new(
//!         Some("http://localhost:5984/mydb".to_string()),
//!         None, // output: stdout
//!         None, // username
//!         None, // password
//!         None, // cookie
//!         None, // split threshold
//!         true, // quiet
//!     )?;
//!
//!     let result = run_export(&config, None).await?;
//!     eprintln!("Exported {} documents", result.documents_exported);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod record;
pub mod source;

// Re-export commonly used types
pub use config::{ExportConfig, SourceLocation};
pub use error::{DumpError, Result};
pub use export::{run_export, ExportCoordinator, ExportResult};
pub use record::{ChangeRecord, DumpHeader};
pub use source::{ChangeFeed, Source};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

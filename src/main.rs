//! couchdump - CouchDB-style database dump tool
//!
//! Streams a document database (remote HTTP or local on-disk store) into a
//! line-delimited JSON dump, optionally split into multiple files by
//! document count, with progress reporting on stderr.
//!
//! # Usage
//!
//! ```bash
//! # Dump a remote database to stdout
//! couchdump http://localhost:5984/mydb > dump.txt
//!
//! # Dump a local store, 100 documents per output file
//! couchdump /path/to/mydb -o dump.txt -s 100
//! ```

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use couchdump::cli::CliArgs;
use couchdump::error::Result;
use couchdump::export::run_export;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments
/// 2. Initialize logging
/// 3. Validate the run configuration (before any I/O)
/// 4. Run the export with Ctrl+C cancellation wired in
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let args = CliArgs::parse_args();

    initialize_logging(&args);

    let config = args.into_config()?;

    // Ctrl+C stops feed consumption; split files already being finalized
    // are still awaited so they are not left torn.
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                signal_token.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    });

    let result = run_export(&config, Some(cancel_token)).await?;

    if result.cancelled {
        return Err(format!(
            "Export cancelled after {} documents; finalized files remain on disk",
            result.documents_exported
        )
        .into());
    }

    Ok(())
}

/// Initialize logging system based on verbosity level
///
/// Log lines go to stderr so a dump streamed to stdout stays clean.
///
/// # Arguments
/// * `args` - CLI arguments with verbosity settings
fn initialize_logging(args: &CliArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

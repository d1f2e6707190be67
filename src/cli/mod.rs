//! Command-line interface for couchdump.
//!
//! This module only parses and hands off: the argument set mirrors the
//! validated [`ExportConfig`](crate::config::ExportConfig) one to one, and
//! every consistency rule (paired credentials, split/output coupling,
//! remote-only auth) lives in the config layer so it is applied the same
//! way no matter how the tool is invoked.

use clap::Parser;
use std::path::PathBuf;

use crate::config::ExportConfig;
use crate::error::Result;

/// Dump a CouchDB-style database to line-delimited JSON.
#[derive(Parser, Debug)]
#[command(
    name = "couchdump",
    version,
    about = "Dump a CouchDB-style database to line-delimited JSON",
    after_help = "Examples:
  couchdump http://localhost:5984/mydb > dump.txt
      Dump the remote database \"mydb\" to dump.txt

  couchdump /path/to/mydb -o dump.txt
      Dump a local database to the specified file instead of stdout

  couchdump /path/to/mydb -o dump.txt -s 100
      Dump every 100 documents to dump_00000000.txt, dump_00000001.txt, ...

  couchdump http://example.com/mydb -u myUsername -p myPassword > dump.txt
      Supply a username and password if the database is protected"
)]
pub struct CliArgs {
    /// Database URL or local filepath
    #[arg(value_name = "DATABASE")]
    pub database: Option<String>,

    /// Output file (else will dump to stdout)
    #[arg(short = 'o', long = "output-file", value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Username for the database (if it's protected)
    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password for the database (if it's protected)
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Cookie for the database (if it's protected)
    #[arg(short = 'c', long, value_name = "COOKIE")]
    pub cookie: Option<String>,

    /// Split into multiple files, for every n docs
    #[arg(short = 's', long, value_name = "DOCS")]
    pub split: Option<u64>,

    /// Quiet mode (no progress bar)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,
}

impl CliArgs {
    /// Parse the process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level implied by the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.very_verbose {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    /// Validate and assemble the run configuration.
    pub fn into_config(self) -> Result<ExportConfig> {
        ExportConfig::new(
            self.database,
            self.output_file,
            self.username,
            self.password,
            self.cookie,
            self.split,
            self.quiet,
        )
    }
}

use std::{fmt, io};

/// Crate-wide `Result` type using [`DumpError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Top-level error type for couchdump operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum DumpError {
    /// Configuration and argument validation errors.
    Config(ConfigError),

    /// Source database errors (probe or change feed).
    Source(SourceError),

    /// Output file errors.
    Write(WriteError),

    /// I/O errors.
    Io(io::Error),

    /// HTTP transport errors.
    Http(reqwest::Error),

    /// JSON serialization errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
///
/// All of these are detected before the source database is contacted and
/// before any output file is created.
#[derive(Debug)]
pub enum ConfigError {
    /// No database URL or filepath was supplied.
    MissingDatabase,

    /// A username was supplied without a password, or vice versa.
    AsymmetricCredentials,

    /// Credentials were supplied for a local (non-network) source.
    CredentialsNotApplicable(String),

    /// A split threshold was supplied without an output file.
    SplitRequiresOutput,

    /// The split threshold must be a positive document count.
    InvalidSplit(u64),

    /// The database URL could not be parsed.
    InvalidUrl { url: String, reason: String },
}

/// Source-database errors.
#[derive(Debug)]
pub enum SourceError {
    /// A local database path does not exist.
    NotFound(String),

    /// The reachability probe failed or returned a non-success status.
    Unavailable {
        identifier: String,
        status: Option<u16>,
    },

    /// The change feed terminated abnormally mid-stream.
    Feed(String),

    /// The stream did not begin with a well-formed header record.
    BadHeader(String),
}

/// Output-file errors. Filesystem failures are treated as non-transient:
/// any of these aborts the export with no retry.
#[derive(Debug)]
pub enum WriteError {
    /// An output file could not be created.
    Create { path: String, reason: String },

    /// Writing or flushing an output file failed.
    Write { path: String, reason: String },

    /// A background file-finalization task died.
    TaskFailed(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::Config(e) => write!(f, "{e}"),
            DumpError::Source(e) => write!(f, "{e}"),
            DumpError::Write(e) => write!(f, "Write error: {e}"),
            DumpError::Io(e) => write!(f, "I/O error: {e}"),
            DumpError::Http(e) => write!(f, "HTTP error: {e}"),
            DumpError::Json(e) => write!(f, "JSON error: {e}"),
            DumpError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingDatabase => {
                write!(f, "You need to supply a database URL or filepath. -h for help")
            }
            ConfigError::AsymmetricCredentials => {
                write!(f, "You must either supply both a username and password, or neither")
            }
            ConfigError::CredentialsNotApplicable(db) => {
                write!(
                    f,
                    "Usernames/passwords are only for remote databases. Is {db} a remote database?"
                )
            }
            ConfigError::SplitRequiresOutput => {
                write!(f, "If you supply a split, you must also supply an output file")
            }
            ConfigError::InvalidSplit(n) => {
                write!(f, "Invalid split size {n}: must be at least 1 document per file")
            }
            ConfigError::InvalidUrl { url, reason } => {
                write!(f, "Invalid database URL '{url}': {reason}")
            }
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(path) => {
                write!(f, "{path} not found. does the file/directory exist?")
            }
            SourceError::Unavailable { identifier, status } => match status {
                Some(code) => write!(f, "{identifier}: {code}"),
                None => write!(f, "{identifier}: unreachable"),
            },
            SourceError::Feed(msg) => write!(f, "Change feed failed: {msg}"),
            SourceError::BadHeader(msg) => write!(f, "Malformed dump header: {msg}"),
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Create { path, reason } => {
                write!(f, "Failed to create {path}: {reason}")
            }
            WriteError::Write { path, reason } => {
                write!(f, "Failed to write {path}: {reason}")
            }
            WriteError::TaskFailed(msg) => write!(f, "File finalization failed: {msg}"),
        }
    }
}

impl std::error::Error for DumpError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SourceError {}
impl std::error::Error for WriteError {}

/* ========================= Conversions to DumpError ========================= */

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        DumpError::Io(err)
    }
}

impl From<reqwest::Error> for DumpError {
    fn from(err: reqwest::Error) -> Self {
        DumpError::Http(err)
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(err: serde_json::Error) -> Self {
        DumpError::Json(err)
    }
}

impl From<ConfigError> for DumpError {
    fn from(err: ConfigError) -> Self {
        DumpError::Config(err)
    }
}

impl From<SourceError> for DumpError {
    fn from(err: SourceError) -> Self {
        DumpError::Source(err)
    }
}

impl From<WriteError> for DumpError {
    fn from(err: WriteError) -> Self {
        DumpError::Write(err)
    }
}

impl From<String> for DumpError {
    fn from(msg: String) -> Self {
        DumpError::Generic(msg)
    }
}

impl From<&str> for DumpError {
    fn from(msg: &str) -> Self {
        DumpError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_is_named() {
        let err = DumpError::from(SourceError::NotFound("/data/mydb".to_string()));
        assert!(err.to_string().contains("/data/mydb"));
    }

    #[test]
    fn test_unavailable_includes_status() {
        let err = SourceError::Unavailable {
            identifier: "http://localhost:5984/mydb".to_string(),
            status: Some(404),
        };
        let msg = err.to_string();
        assert!(msg.contains("http://localhost:5984/mydb"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn test_config_errors_mention_the_fix() {
        assert!(
            ConfigError::AsymmetricCredentials
                .to_string()
                .contains("both a username and password")
        );
        assert!(ConfigError::SplitRequiresOutput.to_string().contains("output file"));
    }
}

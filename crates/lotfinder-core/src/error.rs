use thiserror::Error;

/// Error taxonomy for the index and file-access surfaces.
///
/// Security-relevant variants (`InvalidPath`, `PathTraversalAttempt`,
/// `AccessDenied`, `NotFound`) carry deliberately sanitized messages;
/// the offending paths go to the security log, never to the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid file path")]
    InvalidPath,

    #[error("path rejected")]
    PathTraversalAttempt,

    #[error("access denied")]
    AccessDenied,

    #[error("file not found")]
    NotFound,

    #[error("file exceeds the maximum allowed size ({size} > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("an indexing job is already running")]
    IndexLocked,

    #[error("scan aborted: {0}")]
    ScanFatal(String),

    #[error("search timed out waiting for category probes")]
    SearchTimeout,
}

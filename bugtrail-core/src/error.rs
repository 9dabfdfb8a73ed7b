//! Error types for bugtrail-core

use thiserror::Error;

/// Main error type for the bugtrail-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A report could not be assembled (missing identity or content).
    ///
    /// Surfaced synchronously to the caller and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A file-backed attachment could not be read
    #[error("failed to read attachment {filename}: {source}")]
    Attachment {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// Collector/API error
    #[error("collector error: {0}")]
    Collector(String),

    /// Scheduled job spool error
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Result type alias for bugtrail-core
pub type Result<T> = std::result::Result<T, Error>;

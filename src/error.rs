//! Error types for tubarr
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] is the top-level type returned by every fallible public operation
//! - [`DatabaseError`] wraps catalog store failures with context
//! - [`DownloadError`] covers download-task state violations
//! - [`FetchError`] is what the external media-fetch and listing capabilities return
//!
//! Fetch failures are caught at the download-task boundary and recorded as a
//! terminal `failed` status; they only surface to callers of the listing
//! operations (sync, add channel) where there is no task to absorb them.

use crate::types::DownloadStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tubarr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tubarr
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Catalog store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Channel, playlist or video not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Download-task state error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// External fetch or listing capability failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A library directory could not be read or written
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Directory or file that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Naming template produced an unusable filename
    #[error("invalid naming template: {0}")]
    InvalidTemplate(String),

    /// Sidecar document could not be rendered
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Filesystem`] for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the requested entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Database(DatabaseError::NotFound(_))
        )
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate remote id or season number)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// Classify a sqlx error raised by a write, separating constraint violations
    pub(crate) fn from_write(context: &str, e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::ConstraintViolation(format!("{}: {}", context, e))
            }
            _ => DatabaseError::QueryFailed(format!("{}: {}", context, e)),
        }
    }
}

/// Download-task state errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A status change that the state machine does not allow
    #[error("cannot move video {remote_id} from {from} to {to}")]
    InvalidTransition {
        /// Remote video id
        remote_id: String,
        /// Current status
        from: DownloadStatus,
        /// Requested status
        to: DownloadStatus,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} video {remote_id} in state {current}")]
    InvalidState {
        /// Remote video id
        remote_id: String,
        /// The operation that was attempted (e.g., "retry")
        operation: String,
        /// The status that prevents the operation
        current: DownloadStatus,
    },

    /// No free episode slot could be claimed for the video
    #[error("could not assign an episode number to {remote_id} in season {season}")]
    NumberingExhausted {
        /// Remote video id
        remote_id: String,
        /// Season the video was being placed in
        season: u32,
    },
}

/// Errors returned by the external media-fetch and remote-listing capabilities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch tool could not be started
    #[error("failed to launch fetch tool: {0}")]
    Spawn(String),

    /// The fetch tool ran and exited unsuccessfully
    #[error("fetch tool exited with status {status:?}: {stderr}")]
    ToolFailed {
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Tail of the tool's stderr
        stderr: String,
    },

    /// The tool's output could not be understood
    #[error("malformed fetch output: {0}")]
    MalformedOutput(String),

    /// The remote item does not exist or is not accessible
    #[error("remote item unavailable: {0}")]
    Unavailable(String),

    /// Transient network condition reported by the capability
    #[error("network error: {0}")]
    Network(String),

    /// The operation observed its cancellation token
    #[error("cancelled")]
    Cancelled,
}

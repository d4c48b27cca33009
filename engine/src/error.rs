//! Error types for the upload engine.
//!
//! `UploadError` is the user-facing outcome of a submission and is what the
//! error view displays. `TransportError` is what a single network call
//! produces; the upload controller folds it into `UploadError` and decides
//! whether to retry. `SessionError` covers illegal view-state transitions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::format_file_size;

/// Errors that end (or interrupt) a submission.
///
/// `InvalidType` and `TooLarge` are raised before any network traffic and are
/// never retried. `NetworkFailure` and `ServerError` are retried by the
/// controller; once the retry budget is spent they are wrapped in
/// `UploadFailed`. `RateLimited` is always terminal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    #[error("Invalid file type. Please select a video file.")]
    InvalidType { mime_type: String },

    #[error("File too large. Maximum size is {}.", size_limit(.limit_bytes))]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("{message}")]
    NetworkFailure { message: String },

    #[error("{message}")]
    ServerError { status: u16, message: String },

    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64, message: String },

    /// Retry budget exhausted; `last` is the error from the final attempt.
    #[error("{last}")]
    UploadFailed { attempts: u32, last: Box<UploadError> },
}

fn size_limit(limit_bytes: &u64) -> String {
    format_file_size(*limit_bytes)
}

impl UploadError {
    /// Only transport and server failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::ServerError { .. })
    }

    /// True for the checks that run before anything is sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidType { .. } | Self::TooLarge { .. })
    }
}

/// Errors from a single HTTP exchange with the processing service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s: {message}")]
    RateLimited { retry_after_secs: u64, message: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network { message } => UploadError::NetworkFailure { message },
            TransportError::Server { status, message } => UploadError::ServerError { status, message },
            TransportError::RateLimited {
                retry_after_secs,
                message,
            } => UploadError::RateLimited {
                retry_after_secs,
                message,
            },
            // The local file vanished or became unreadable between attempts.
            TransportError::Io { path, source } => UploadError::NetworkFailure {
                message: format!("Failed to read {}: {}", path.display(), source),
            },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network {
            message: err.to_string(),
        }
    }
}

/// Errors from the view state machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("an upload is already in progress")]
    UploadInProgress,

    #[error("Please enter a duration between 1-60 minutes")]
    InvalidDuration { minutes: i64 },

    #[error(transparent)]
    Rejected(#[from] UploadError),
}

/// Errors fetching produced segments.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no results to download")]
    NoResults,

    #[error("failed to download {filename}: {source}")]
    Segment {
        filename: String,
        source: TransportError,
    },

    #[error("failed to create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
}

/// Errors loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Errors from probing a local media file for metadata.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("metadata probing is disabled")]
    Disabled,

    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] io::Error),

    #[error("ffprobe failed: {0}")]
    Failed(String),

    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    #[error("no video stream found")]
    NoVideoStream,
}

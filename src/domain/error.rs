//! Domain-level error types for outline-export.
//!
//! All errors are typed with `thiserror`. Transport failures never carry the
//! raw response body; bodies are logged where they are read.

use thiserror::Error;

/// Application-level errors shared by every layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network-level failure while talking to the service.
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The service answered with a non-success status code.
    #[error("Request failed with status code {status}")]
    RequestFailed { status: u16 },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The service returned something the client does not understand.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The export job ended in the error state.
    #[error("File operation {id} failed: {message}")]
    JobFailed { id: String, message: String },

    /// The export job expired before it could be downloaded.
    #[error("File operation {id} expired")]
    JobExpired { id: String },

    /// The wait deadline elapsed before the job finished.
    #[error("Timed out after {waited_secs}s waiting for file operation")]
    Timeout { waited_secs: u64 },

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// An archive entry path could not be decoded.
    #[error("Invalid archive path {path:?}: {message}")]
    InvalidPath { path: String, message: String },

    /// A filter pattern could not be compiled.
    #[error("Invalid filter pattern {pattern:?}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The downloaded archive could not be read.
    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create an HTTP error from a reqwest error.
    pub fn http(err: reqwest::Error) -> Self {
        Self::Http {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an archive error from a zip error.
    pub fn archive(err: zip::result::ZipError) -> Self {
        Self::Archive {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an invalid path error for an archive entry.
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the service reported the resource as unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RequestFailed { status: 404 })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

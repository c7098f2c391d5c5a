//! Domain models for Outline file operations.
//!
//! These models mirror the JSON returned by the `fileOperations.*` endpoints.
//! The client only ever holds read-only snapshots of them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encoding requested for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Outline-flavoured Markdown.
    #[serde(rename = "outline-markdown", alias = "markdown")]
    Markdown,
    /// Rendered HTML.
    #[serde(rename = "html")]
    Html,
    /// Outline JSON documents.
    #[serde(rename = "json")]
    Json,
    /// A format this client does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ExportFormat {
    /// Value sent to and received from the service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "outline-markdown",
            Self::Html => "html",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" | "outline-markdown" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: markdown, html, json")),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationType {
    Export,
    Import,
    #[serde(other)]
    Other,
}

/// Lifecycle state of a file operation.
///
/// `creating -> uploading -> complete` is the success path; `error` and
/// `expired` are terminal failures. Unrecognized values are kept verbatim so
/// they can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileOperationState {
    Creating,
    Uploading,
    Complete,
    Error,
    Expired,
    Unknown(String),
}

impl FileOperationState {
    /// Whether the job is still being produced by the service.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Creating | Self::Uploading)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Expired => "expired",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for FileOperationState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "creating" => Self::Creating,
            "uploading" => Self::Uploading,
            "complete" => Self::Complete,
            "error" => Self::Error,
            "expired" => Self::Expired,
            _ => Self::Unknown(value),
        }
    }
}

impl From<FileOperationState> for String {
    fn from(state: FileOperationState) -> Self {
        match state {
            FileOperationState::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FileOperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error attached to a failed file operation.
///
/// The service sends either a bare string or an object; both decode into
/// this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ErrorPayload")]
pub struct FileOperationError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Wire forms of [`FileOperationError`], structured first.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Structured(StructuredError),
    Message(String),
}

#[derive(Deserialize)]
struct StructuredError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    ok: Option<bool>,
    /// Sometimes sent as a float such as `500.0`.
    #[serde(default)]
    status: Option<f64>,
}

impl From<ErrorPayload> for FileOperationError {
    fn from(payload: ErrorPayload) -> Self {
        match payload {
            ErrorPayload::Message(message) => Self {
                message,
                ..Self::default()
            },
            ErrorPayload::Structured(raw) => Self {
                message: raw
                    .message
                    .filter(|m| !m.is_empty())
                    .or_else(|| raw.error.clone())
                    .unwrap_or_default(),
                error: raw.error,
                data: raw.data,
                ok: raw.ok,
                status: raw.status.and_then(status_code),
            },
        }
    }
}

/// Integral HTTP status from a JSON number, if it is one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn status_code(value: f64) -> Option<u16> {
    (value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value)).then(|| value as u16)
}

impl std::fmt::Display for FileOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            f.write_str("unknown error")
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Snapshot of a remote export/import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperation {
    /// Stable identifier of the job.
    pub id: String,
    /// Display name (usually the archive file name).
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileOperationType,
    #[serde(default)]
    pub format: ExportFormat,
    pub state: FileOperationState,
    /// Present when `state` is `error`.
    #[serde(default)]
    pub error: Option<FileOperationError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileOperation {
    /// Whether the job was created at most `max_age` before `now`.
    #[must_use]
    pub fn is_recent(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        // Jobs stamped in the future (clock skew) count as brand new.
        (now - self.created_at)
            .to_std()
            .map_or(true, |age| age <= max_age)
    }

    /// Whether this is a recent export of `format`.
    #[must_use]
    pub fn is_recent_export(&self, format: ExportFormat, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.kind == FileOperationType::Export && self.format == format && self.is_recent(max_age, now)
    }

    /// Whether this job can be reused instead of starting a new export.
    #[must_use]
    pub fn is_reusable(&self, format: ExportFormat, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.is_recent_export(format, max_age, now)
            && (self.state.is_pending() || self.state == FileOperationState::Complete)
    }

    /// Message of the embedded error, if any.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map_or_else(|| "unknown error".to_string(), ToString::to_string)
    }
}

/// Offset pagination returned by list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub next_path: Option<String>,
}

//! Configuration models.
//!
//! `FileConfig` is the optional TOML file; `ClientConfig` and `ExportConfig`
//! are the validated values handed to the application layer.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};
use super::models::ExportFormat;

/// Service used when no URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://app.getoutline.com";

/// User agent sent with every request.
pub const USER_AGENT: &str = "outline-export";

/// Optional settings loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub format: Option<ExportFormat>,
    #[serde(default)]
    pub exclude_attachments: Option<bool>,
    #[serde(default)]
    pub extract: Option<bool>,
    #[serde(default)]
    pub export_path: Option<PathBuf>,
    #[serde(default)]
    pub filters: Option<Vec<String>>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_job_age_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("outline-export").join("config.toml"))
    }
}

/// Connection settings for the Outline API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL ending in `/api`.
    pub base_url: String,
    /// API token sent as a bearer token.
    pub token: String,
    /// Timeout for non-streaming requests.
    pub request_timeout: Duration,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Build a client configuration, normalizing the base URL.
    ///
    /// # Errors
    /// Returns error if the token is empty.
    pub fn new(base_url: Option<&str>, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(AppError::Config {
                message: "token is required".into(),
            });
        }

        Ok(Self {
            base_url: normalize_base_url(base_url.unwrap_or(DEFAULT_BASE_URL)),
            token: token.trim().to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL of an API method such as `/fileOperations.info`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Strip trailing `/` and `/api`, then append `/api` once.
fn normalize_base_url(url: &str) -> String {
    let url = if url.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        url.trim()
    };
    let url = url.strip_suffix('/').unwrap_or(url);
    let url = url.strip_suffix("/api").unwrap_or(url);
    format!("{url}/api")
}

/// Settings for waiting on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between status checks.
    pub interval: Duration,
    /// Overall deadline for the job to finish.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the export driver needs.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub include_attachments: bool,
    /// Unpack the archive instead of saving it as-is.
    pub extract: bool,
    /// Destination file, or directory when extracting.
    pub export_path: PathBuf,
    /// Glob patterns applied to extracted paths.
    pub filters: Vec<String>,
    pub poll: PollConfig,
    /// Jobs older than this are neither reused nor cleaned up.
    pub max_job_age: Duration,
    /// Skip deleting export jobs after the download.
    pub keep_jobs: bool,
}

impl ExportConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(format: ExportFormat, export_path: PathBuf) -> Self {
        Self {
            format,
            include_attachments: true,
            extract: false,
            export_path,
            filters: Vec::new(),
            poll: PollConfig::default(),
            max_job_age: Duration::from_secs(60 * 60),
            keep_jobs: false,
        }
    }

    /// Validate values that cannot be checked by the type system.
    ///
    /// # Errors
    /// Returns error if a value is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.format == ExportFormat::Unknown {
            return Err(AppError::Config {
                message: "format must be one of: markdown, html, json".into(),
            });
        }
        if self.export_path.as_os_str().is_empty() {
            return Err(AppError::Config {
                message: "export path is required".into(),
            });
        }
        if self.poll.interval.is_zero() {
            return Err(AppError::Config {
                message: "poll interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

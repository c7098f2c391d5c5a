//! CLI interface using clap.
//!
//! Every option can also come from the environment or the config file;
//! flags and environment variables win over the file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::domain::{AppError, ClientConfig, ExportConfig, ExportFormat, FileConfig, Result};

/// Outline Export - download and unpack knowledge-base exports from Outline.
#[derive(Parser, Debug)]
#[command(name = "outline-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML config file.
    #[arg(long, env = "CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Outline base URL, with or without the trailing /api.
    #[arg(long, env = "URL", global = true)]
    pub url: Option<String>,

    /// API token.
    #[arg(long, env = "TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export all collections and save or extract the archive.
    Export(ExportArgs),

    /// List recent export jobs.
    Jobs {
        /// Maximum number of jobs to show.
        #[arg(short, long, default_value = "25")]
        limit: usize,
    },

    /// Delete an export job.
    Delete {
        /// File operation ID.
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// Export format: markdown, html, or json.
    #[arg(short, long, env = "FORMAT")]
    pub format: Option<ExportFormat>,

    /// Leave attachments out of the export.
    #[arg(long, env = "EXCLUDE_ATTACHMENTS")]
    pub exclude_attachments: bool,

    /// Unpack the archive instead of saving the zip.
    #[arg(long, env = "EXTRACT")]
    pub extract: bool,

    /// Zip file to write, or directory to extract into.
    #[arg(short = 'o', long, env = "EXPORT_PATH")]
    pub export_path: Option<PathBuf>,

    /// Glob patterns selecting entries to extract (comma separated).
    #[arg(long, env = "FILTERS", value_delimiter = ',')]
    pub filters: Vec<String>,

    /// Seconds between status checks.
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Maximum seconds to wait for the export to finish.
    #[arg(long)]
    pub wait_timeout: Option<u64>,

    /// Reuse and clean up jobs younger than this many seconds.
    #[arg(long)]
    pub max_job_age: Option<u64>,

    /// Do not delete export jobs after downloading.
    #[arg(long)]
    pub keep_jobs: bool,
}

impl Cli {
    /// Resolve connection settings from flags, environment and file.
    ///
    /// # Errors
    /// Returns error if no token is configured.
    pub fn client_config(&self, file: &FileConfig) -> Result<ClientConfig> {
        let url = self.url.as_deref().or(file.url.as_deref());
        let token = self
            .token
            .as_deref()
            .or(file.token.as_deref())
            .ok_or_else(|| AppError::Config {
                message: "token is required (--token, TOKEN or config file)".into(),
            })?;

        let config = ClientConfig::new(url, token)?;
        Ok(match file.request_timeout_secs {
            Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
            None => config,
        })
    }
}

impl ExportArgs {
    /// Resolve export settings from flags, environment and file.
    ///
    /// # Errors
    /// Returns error if the format or export path is missing or invalid.
    pub fn export_config(&self, file: &FileConfig) -> Result<ExportConfig> {
        let format = self.format.or(file.format).ok_or_else(|| AppError::Config {
            message: "format is required (--format, FORMAT or config file)".into(),
        })?;
        let export_path = self
            .export_path
            .clone()
            .or_else(|| file.export_path.clone())
            .ok_or_else(|| AppError::Config {
                message: "export path is required (--export-path, EXPORT_PATH or config file)"
                    .into(),
            })?;

        let mut config = ExportConfig::new(format, export_path);
        config.include_attachments =
            !(self.exclude_attachments || file.exclude_attachments.unwrap_or(false));
        config.extract = self.extract || file.extract.unwrap_or(false);
        config.filters = if self.filters.is_empty() {
            file.filters.clone().unwrap_or_default()
        } else {
            self.filters.clone()
        };
        config.filters.retain(|f| !f.trim().is_empty());
        config.keep_jobs = self.keep_jobs;

        if let Some(secs) = self.poll_interval.or(file.poll_interval_secs) {
            config.poll.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.wait_timeout.or(file.wait_timeout_secs) {
            config.poll.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_job_age.or(file.max_job_age_secs) {
            config.max_job_age = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

//! Artifact materialization.
//!
//! Saves a downloaded export verbatim, or spools it to a temporary file and
//! unpacks the zip into a sanitized directory tree.
//!
//! Extraction is at-most-once and not atomic: the first failing entry aborts
//! the run and files written before it are left in place. Running again
//! overwrites them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek};
use std::path::Path;

use futures_util::StreamExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, Result};
use crate::infrastructure::ByteStream;

use super::sanitize::{sanitize_entry_path, sanitize_segment};

/// Glob filters applied to sanitized entry paths.
///
/// An empty filter accepts everything. Patterns match the whole relative
/// path and `*` may cross directory separators.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    set: Option<GlobSet>,
}

impl EntryFilter {
    /// Compile the given patterns.
    ///
    /// # Errors
    /// Returns error if a pattern is not a valid glob.
    pub fn new(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| AppError::InvalidFilter {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|source| AppError::InvalidFilter {
            pattern: patterns.join(","),
            source,
        })?;

        Ok(Self { set: Some(set) })
    }

    /// Whether `path` should be extracted.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.set.as_ref().is_none_or(|set| set.is_match(path))
    }
}

/// Summary of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub files: usize,
    pub directories: usize,
    /// Entries dropped by the filter or with an empty sanitized path.
    pub skipped: usize,
    /// Bytes written to files.
    pub bytes: u64,
}

/// Copy the artifact stream verbatim to `destination`.
///
/// # Errors
/// Returns error if the stream fails, is cancelled, or the file cannot be written.
pub async fn save_artifact(
    mut stream: ByteStream,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir_all(parent)?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(destination).await.map_err(|e| {
        AppError::io(format!("Failed to create export file {}", destination.display()), e)
    })?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(|e| {
            AppError::io(format!("Failed to write export file {}", destination.display()), e)
        })?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::io("Failed to flush export file", e))?;

    tracing::info!(file = %destination.display(), bytes = written, "Export file written");

    Ok(written)
}

/// Spool the artifact to a temporary file and unpack it into `destination`.
///
/// The temporary file is removed on every exit path.
///
/// # Errors
/// Returns error if spooling or extraction fails.
pub async fn extract_artifact(
    stream: ByteStream,
    job_id: &str,
    destination: &Path,
    filter: EntryFilter,
    cancel: &CancellationToken,
) -> Result<ExtractionReport> {
    create_private_dir_all(destination)?;

    let spooled = spool_to_tempfile(stream, job_id, cancel).await?;
    let reader = spooled
        .reopen()
        .map_err(|e| AppError::io("Failed to reopen spooled archive", e))?;
    let destination = destination.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let report = extract_archive(reader, &destination, &filter);
        drop(spooled);
        report
    })
    .await
    .map_err(|e| AppError::io("Extraction task failed", io::Error::other(e)))?
}

/// Drain the stream into a named temporary zip file.
async fn spool_to_tempfile(
    mut stream: ByteStream,
    job_id: &str,
    cancel: &CancellationToken,
) -> Result<NamedTempFile> {
    let spooled = tempfile::Builder::new()
        .prefix(&spool_prefix(job_id))
        .suffix(".zip")
        .tempfile()
        .map_err(|e| AppError::io("Failed to create temporary file", e))?;

    let handle = spooled
        .reopen()
        .map_err(|e| AppError::io("Failed to open temporary file", e))?;
    let mut file = tokio::fs::File::from_std(handle);

    let mut length = 0u64;
    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::io("Failed to stream export to temporary file", e))?;
        length += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::io("Failed to flush temporary file", e))?;

    tracing::debug!(path = %spooled.path().display(), bytes = length, "Archive spooled");

    Ok(spooled)
}

/// Temporary file prefix for a job; the id is reduced to one safe segment.
fn spool_prefix(job_id: &str) -> String {
    format!("outline-export-{}-", sanitize_segment(job_id))
}

/// Unpack a zip archive into `destination`, in archive order.
///
/// # Errors
/// Returns error on the first entry that cannot be decoded or written.
pub fn extract_archive<R: Read + Seek>(
    reader: R,
    destination: &Path,
    filter: &EntryFilter,
) -> Result<ExtractionReport> {
    let mut archive = zip::ZipArchive::new(reader).map_err(AppError::archive)?;
    let mut report = ExtractionReport::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(AppError::archive)?;
        let relative = sanitize_entry_path(entry.name())?;

        if relative.as_os_str().is_empty() {
            tracing::debug!(entry = entry.name(), "Skipping entry with empty path");
            report.skipped += 1;
            continue;
        }

        if !filter.matches(&relative) {
            tracing::warn!(path = %relative.display(), "Skipping file/folder (does not match filter)");
            report.skipped += 1;
            continue;
        }

        let target = destination.join(&relative);

        if entry.is_dir() {
            tracing::info!(path = %relative.display(), "Creating directory");
            create_private_dir_all(&target)?;
            report.directories += 1;
            continue;
        }

        tracing::info!(path = %relative.display(), "Creating file");
        if let Some(parent) = target.parent() {
            create_private_dir_all(parent)?;
        }

        let mut output = create_private_file(&target)?;
        report.bytes += io::copy(&mut entry, &mut output)
            .map_err(|e| AppError::io(format!("Failed to copy file {}", relative.display()), e))?;
        report.files += 1;
    }

    tracing::info!(
        files = report.files,
        directories = report.directories,
        skipped = report.skipped,
        bytes = report.bytes,
        "Archive extracted"
    );

    Ok(report)
}

/// Create a directory and its parents, owner-only on Unix.
fn create_private_dir_all(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder
        .create(path)
        .map_err(|e| AppError::io(format!("Failed to create directory {}", path.display()), e))
}

/// Create or truncate a file, owner-only on Unix.
fn create_private_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(path)
        .map_err(|e| AppError::io(format!("Failed to create file {}", path.display()), e))
}

//! End-to-end export run.
//!
//! Reuses or starts an export job, waits for it, materializes the artifact
//! and deletes the consumed jobs.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::domain::{ExportConfig, FileOperation, FileOperationState, Result};
use crate::infrastructure::Transport;

use super::client::JobClient;
use super::extractor::{extract_artifact, save_artifact, EntryFilter, ExtractionReport};
use super::poller::wait_for_job;

/// Where the artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Archive saved as-is.
    Saved { path: PathBuf, bytes: u64 },
    /// Archive unpacked into a directory.
    Extracted {
        path: PathBuf,
        report: ExtractionReport,
    },
}

/// Result of deleting consumed jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub job: FileOperation,
    pub artifact: ArtifactOutcome,
    pub cleanup: CleanupReport,
}

/// Drives one export from request to files on disk.
pub struct ExportService<T> {
    client: JobClient<T>,
    config: ExportConfig,
}

impl<T: Transport> ExportService<T> {
    #[must_use]
    pub const fn new(client: JobClient<T>, config: ExportConfig) -> Self {
        Self { client, config }
    }

    /// Run the whole export.
    ///
    /// # Errors
    /// Returns error if the job cannot be obtained, fails, times out, or the
    /// artifact cannot be written. Cleanup problems are only logged.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ExportOutcome> {
        self.config.validate()?;
        // Compile filters before any network traffic.
        let filter = EntryFilter::new(&self.config.filters)?;

        let job = self.find_or_create(cancel).await?;
        let job = wait_for_job(&self.client, &job.id, &self.config.poll, cancel).await?;
        let artifact = self.download(&job, filter, cancel).await?;

        let cleanup = if self.config.keep_jobs {
            tracing::debug!("Keeping export jobs");
            CleanupReport::default()
        } else {
            self.cleanup(cancel).await
        };

        Ok(ExportOutcome {
            job,
            artifact,
            cleanup,
        })
    }

    /// Reuse a recent matching export, or start a new one.
    ///
    /// # Errors
    /// Returns error if listing or creating fails.
    pub async fn find_or_create(&self, cancel: &CancellationToken) -> Result<FileOperation> {
        let now = Utc::now();
        let mut pages = self.client.list_jobs(cancel);

        while let Some(job) = pages.next().await {
            let job = job?;
            if job.is_reusable(self.config.format, self.config.max_job_age, now) {
                tracing::info!(id = %job.id, state = %job.state, "Reusing existing export");
                return Ok(job);
            }
        }

        tracing::info!(format = %self.config.format, "No reusable export found, creating one");
        self.client
            .create_export(self.config.format, self.config.include_attachments, cancel)
            .await
    }

    /// Fetch the artifact of a complete job and write it out.
    ///
    /// # Errors
    /// Returns error if the download or the write fails.
    pub async fn download(
        &self,
        job: &FileOperation,
        filter: EntryFilter,
        cancel: &CancellationToken,
    ) -> Result<ArtifactOutcome> {
        let stream = self.client.download_artifact(&job.id, cancel).await?;
        let path = self.config.export_path.clone();

        if self.config.extract {
            tracing::info!(id = %job.id, path = %path.display(), "Extracting export");
            let report = extract_artifact(stream, &job.id, &path, filter, cancel).await?;
            Ok(ArtifactOutcome::Extracted { path, report })
        } else {
            tracing::info!(id = %job.id, path = %path.display(), "Saving export");
            let bytes = save_artifact(stream, &path, cancel).await?;
            Ok(ArtifactOutcome::Saved { path, bytes })
        }
    }

    /// Delete recent exports of the configured format.
    ///
    /// Never fails: listing problems end the cleanup, delete problems skip
    /// the job.
    pub async fn cleanup(&self, cancel: &CancellationToken) -> CleanupReport {
        let now = Utc::now();
        let mut report = CleanupReport::default();
        let mut candidates = Vec::new();

        let mut pages = self.client.list_jobs(cancel);
        while let Some(job) = pages.next().await {
            match job {
                Ok(job) => {
                    if job.state != FileOperationState::Error
                        && job.is_recent_export(self.config.format, self.config.max_job_age, now)
                    {
                        candidates.push(job.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list exports for cleanup");
                    break;
                }
            }
        }

        for id in candidates {
            tracing::info!(id = %id, "Deleting export");
            match self.client.delete_job(&id, cancel).await {
                Ok(()) => report.deleted += 1,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(id = %id, "Export already deleted");
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Failed to delete export");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::time::Duration;

    use super::*;
    use crate::domain::{AppError, ExportFormat};
    use crate::infrastructure::mock::{body_id, body_offset, job_json, MockTransport};
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("Handbook/Welcome%20Aboard.md", options).unwrap();
        writer.write_all(b"# Welcome").unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// Service backed by a fixed job listing; info always reports complete.
    fn service(
        jobs: Vec<Value>,
        deleted_ids: &'static [&'static str],
        config: ExportConfig,
    ) -> ExportService<MockTransport> {
        let now = Utc::now();
        let transport = MockTransport::new(move |request| match request.path.as_str() {
            "/fileOperations.list" => {
                let offset = body_offset(request);
                let page: Vec<Value> = jobs.iter().skip(offset).take(25).cloned().collect();
                Ok(json!({
                    "pagination": { "limit": 25, "offset": offset, "total": jobs.len() },
                    "data": page,
                }))
            }
            "/collections.export_all" => Ok(json!({
                "data": { "fileOperation": job_json("new-op", "creating", "outline-markdown", now) }
            })),
            "/fileOperations.info" => Ok(json!({
                "data": job_json(&body_id(request), "complete", "outline-markdown", now)
            })),
            "/fileOperations.delete" => {
                let id = body_id(request);
                if deleted_ids.contains(&id.as_str()) {
                    Err(AppError::RequestFailed { status: 404 })
                } else {
                    Ok(Value::String("{\"success\":true}".into()))
                }
            }
            other => panic!("unexpected call to {other}"),
        })
        .with_artifact(archive());

        ExportService::new(JobClient::new(transport), config)
    }

    fn config(path: PathBuf) -> ExportConfig {
        let mut config = ExportConfig::new(ExportFormat::Markdown, path);
        config.poll.interval = Duration::from_secs(1);
        config
    }

    fn ago(minutes: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_recent_matching_export() {
        let dir = tempdir().unwrap();
        let jobs = vec![
            job_json("html-op", "complete", "html", ago(5)),
            job_json("old-op", "complete", "outline-markdown", ago(120)),
            job_json("failed-op", "error", "outline-markdown", ago(5)),
            job_json("fresh-op", "uploading", "outline-markdown", ago(10)),
        ];
        let service = service(jobs, &[], config(dir.path().join("out.zip")));

        let job = service.find_or_create(&CancellationToken::new()).await.unwrap();

        assert_eq!(job.id, "fresh-op");
        assert_eq!(service.client.transport().calls("/collections.export_all"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_export_when_nothing_matches() {
        let dir = tempdir().unwrap();
        let jobs = vec![job_json("html-op", "complete", "html", ago(5))];
        let service = service(jobs, &[], config(dir.path().join("out.zip")));

        let job = service.find_or_create(&CancellationToken::new()).await.unwrap();

        assert_eq!(job.id, "new-op");
        let create = service
            .client
            .transport()
            .requests()
            .into_iter()
            .find(|r| r.path == "/collections.export_all")
            .unwrap();
        assert_eq!(
            create.body.unwrap(),
            json!({ "format": "outline-markdown", "includeAttachments": true })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_continues_after_missing_job() {
        let dir = tempdir().unwrap();
        let jobs = vec![
            job_json("a", "complete", "outline-markdown", ago(1)),
            job_json("gone", "complete", "outline-markdown", ago(2)),
            job_json("b", "creating", "outline-markdown", ago(3)),
            job_json("broken", "error", "outline-markdown", ago(3)),
            job_json("json-op", "complete", "json", ago(3)),
        ];
        let service = service(jobs, &["gone"], config(dir.path().join("out.zip")));

        let report = service.cleanup(&CancellationToken::new()).await;

        assert_eq!(report, CleanupReport { deleted: 2, failed: 0 });
        let deleted: Vec<String> = service
            .client
            .transport()
            .requests()
            .iter()
            .filter(|r| r.path == "/fileOperations.delete")
            .map(body_id)
            .collect();
        assert_eq!(deleted, vec!["a", "gone", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_survives_listing_failure() {
        let service = ExportService::new(
            JobClient::new(MockTransport::new(|_| Err(AppError::RequestFailed { status: 500 }))),
            config(PathBuf::from("unused")),
        );

        let report = service.cleanup(&CancellationToken::new()).await;

        assert_eq!(report, CleanupReport::default());
        assert_eq!(service.client.transport().calls("/fileOperations.delete"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_extracts_and_cleans_up() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("kb");
        let mut config = config(dest.clone());
        config.extract = true;
        let service = service(Vec::new(), &[], config);

        let outcome = service.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.job.id, "new-op");
        match outcome.artifact {
            ArtifactOutcome::Extracted { path, report } => {
                assert_eq!(path, dest);
                assert_eq!(report.files, 1);
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
        assert_eq!(
            std::fs::read(dest.join("Handbook").join("Welcome Aboard.md")).unwrap(),
            b"# Welcome"
        );
        // The empty listing leaves nothing to delete.
        assert_eq!(outcome.cleanup, CleanupReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_saves_raw_archive_and_keeps_jobs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.zip");
        let mut config = config(path.clone());
        config.keep_jobs = true;
        let jobs = vec![job_json("ready", "complete", "outline-markdown", ago(1))];
        let service = service(jobs, &[], config);

        let outcome = service.run(&CancellationToken::new()).await.unwrap();

        let saved = std::fs::read(&path).unwrap();
        assert_eq!(
            outcome.artifact,
            ArtifactOutcome::Saved {
                path: path.clone(),
                bytes: saved.len() as u64,
            }
        );
        assert!(saved.starts_with(b"PK"));
        assert_eq!(service.client.transport().calls("/fileOperations.delete"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_filter_fails_before_network() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path().join("kb"));
        config.filters = vec!["[".into()];
        let service = service(Vec::new(), &[], config);

        let err = service.run(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidFilter { .. }));
        assert!(service.client.transport().requests().is_empty());
    }
}

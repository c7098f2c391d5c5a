//! Client for Outline's file operation endpoints.
//!
//! Wraps a [`Transport`] with typed calls: create an export, fetch, list and
//! delete jobs, and open the artifact download.

use std::collections::VecDeque;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, ExportFormat, FileOperation, Pagination, Result};
use crate::infrastructure::{ApiRequest, ByteStream, Transport};

/// Jobs requested per list call.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Pause between two list calls.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportCreated {
    file_operation: FileOperation,
}

#[derive(Debug, Deserialize)]
struct JobPage {
    #[serde(default)]
    pagination: Pagination,
    #[serde(default)]
    data: Vec<FileOperation>,
}

/// Typed access to export jobs.
pub struct JobClient<T> {
    transport: T,
    page_size: usize,
    page_delay: Duration,
}

impl<T: Transport> JobClient<T> {
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Override list paging.
    #[must_use]
    pub fn with_paging(mut self, page_size: usize, page_delay: Duration) -> Self {
        self.page_size = page_size.max(1);
        self.page_delay = page_delay;
        self
    }

    #[cfg(test)]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    async fn request<R: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<R> {
        let body = self.transport.send(request, cancel).await?;
        serde_json::from_slice(&body).map_err(AppError::json_parse)
    }

    async fn request_text(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<String> {
        let body = self.transport.send(request, cancel).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Start an export of all collections.
    ///
    /// The returned job is usually still being created; see
    /// [`super::poller::wait_for_job`].
    ///
    /// # Errors
    /// Returns error if the request fails or the response cannot be decoded.
    pub async fn create_export(
        &self,
        format: ExportFormat,
        include_attachments: bool,
        cancel: &CancellationToken,
    ) -> Result<FileOperation> {
        let request = ApiRequest::post(
            "/collections.export_all",
            json!({
                "format": format,
                "includeAttachments": include_attachments,
            }),
        );
        let response: DataEnvelope<ExportCreated> = self.request(&request, cancel).await?;
        let job = response.data.file_operation;

        tracing::info!(id = %job.id, format = %format, state = %job.state, "Export requested");

        Ok(job)
    }

    /// Fetch the current snapshot of a job.
    ///
    /// # Errors
    /// Returns error if the request fails; an unknown id yields a 404
    /// (see [`AppError::is_not_found`]).
    pub async fn get_job(&self, id: &str, cancel: &CancellationToken) -> Result<FileOperation> {
        let request = ApiRequest::post("/fileOperations.info", json!({ "id": id }));
        let response: DataEnvelope<FileOperation> = self.request(&request, cancel).await?;
        Ok(response.data)
    }

    /// Delete a job.
    ///
    /// # Errors
    /// Returns error if the request fails, including for already deleted jobs.
    pub async fn delete_job(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let request = ApiRequest::post("/fileOperations.delete", json!({ "id": id }));
        let body = self.request_text(&request, cancel).await?;
        tracing::trace!(id, response = %body, "Delete acknowledged");
        Ok(())
    }

    /// Open the artifact of a complete job as a byte stream.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn download_artifact(&self, id: &str, cancel: &CancellationToken) -> Result<ByteStream> {
        let request = ApiRequest::get("/fileOperations.redirect").query("id", id);
        self.transport.open_stream(&request, cancel).await
    }

    /// Lazily page through export jobs.
    #[must_use]
    pub fn list_jobs<'a>(&'a self, cancel: &'a CancellationToken) -> JobPages<'a, T> {
        JobPages {
            client: self,
            cancel,
            buffer: VecDeque::new(),
            offset: 0,
            yielded: 0,
            total: None,
            pages_fetched: 0,
            done: false,
        }
    }

    async fn fetch_page(&self, offset: usize, cancel: &CancellationToken) -> Result<JobPage> {
        let request = ApiRequest::post(
            "/fileOperations.list",
            json!({
                "limit": self.page_size,
                "offset": offset,
                "type": "export",
            }),
        );
        self.request(&request, cancel).await
    }
}

/// Pull-based sequence over all export jobs.
///
/// A page is only requested when the consumer asks for an item past the end
/// of the current page, so stopping early never fetches more pages. The
/// first error is returned once and ends the sequence.
pub struct JobPages<'a, T> {
    client: &'a JobClient<T>,
    cancel: &'a CancellationToken,
    buffer: VecDeque<FileOperation>,
    offset: usize,
    yielded: usize,
    total: Option<usize>,
    pages_fetched: usize,
    done: bool,
}

impl<T: Transport> JobPages<'_, T> {
    /// Next job, or `None` when the listing is exhausted.
    pub async fn next(&mut self) -> Option<Result<FileOperation>> {
        loop {
            if let Some(job) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(job));
            }
            if self.done || self.total.is_some_and(|total| self.yielded >= total) {
                self.done = true;
                return None;
            }

            if self.pages_fetched > 0 {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        self.done = true;
                        return Some(Err(AppError::Cancelled));
                    }
                    () = tokio::time::sleep(self.client.page_delay) => {}
                }
            }

            match self.client.fetch_page(self.offset, self.cancel).await {
                Ok(page) => {
                    self.pages_fetched += 1;
                    self.offset += self.client.page_size;
                    self.total = Some(page.pagination.total);
                    tracing::debug!(
                        offset = page.pagination.offset,
                        received = page.data.len(),
                        total = page.pagination.total,
                        "Fetched job page"
                    );
                    if page.data.is_empty() {
                        self.done = true;
                    }
                    self.buffer.extend(page.data);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

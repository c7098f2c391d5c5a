//! Scripted transport for tests.

use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, Result};

use super::http::{ApiRequest, ByteStream, Transport};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<Value> + Send + Sync>;

/// Answers every call through a closure and records the requests.
///
/// A `Value::String` response is returned as raw text, anything else is
/// serialized as JSON. Streams return the configured artifact bytes.
pub struct MockTransport {
    handler: Handler,
    artifact: Vec<u8>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            artifact: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_artifact(mut self, artifact: Vec<u8>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls made to `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    fn record(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Bytes> {
        self.record(request, cancel)?;
        match (self.handler)(request)? {
            Value::String(text) => Ok(Bytes::from(text)),
            other => Ok(Bytes::from(serde_json::to_vec(&other).unwrap())),
        }
    }

    async fn open_stream(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        self.record(request, cancel)?;
        let chunks: Vec<Result<Bytes>> = self
            .artifact
            .chunks(1024)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

/// JSON of an export job as returned by the service.
pub fn job_json(id: &str, state: &str, format: &str, created_at: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "name": format!("{id}.zip"),
        "type": "export",
        "format": format,
        "state": state,
        "error": null,
        "createdAt": created_at.to_rfc3339(),
        "updatedAt": created_at.to_rfc3339(),
    })
}

/// Id passed in a JSON request body.
pub fn body_id(request: &ApiRequest) -> String {
    request
        .body
        .as_ref()
        .and_then(|b| b.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Offset passed to `fileOperations.list`.
pub fn body_offset(request: &ApiRequest) -> usize {
    request
        .body
        .as_ref()
        .and_then(|b| b.get("offset"))
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize
}

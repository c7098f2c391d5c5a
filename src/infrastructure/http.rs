//! HTTP transport for the Outline API.
//!
//! Every call carries the bearer token and the fixed user agent, and can be
//! cancelled through a [`CancellationToken`]. Status codes of 299 and above
//! are failures: the body is logged, the error only carries the status.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, ClientConfig, Result, USER_AGENT};

/// Response body streamed chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A call against an API method such as `/fileOperations.info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// POST with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// GET without a body.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Performs authenticated calls against the service.
pub trait Transport: Send + Sync {
    /// Perform the call and return the whole response body.
    ///
    /// # Errors
    /// Returns error on network failure, cancellation or a non-success status.
    fn send(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Bytes>> + Send;

    /// Perform the call and hand back the live response body.
    ///
    /// The stream is not buffered; dropping it closes the connection.
    ///
    /// # Errors
    /// Returns error on network failure, cancellation or a non-success status.
    fn open_stream(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ByteStream>> + Send;
}

/// Production transport built on `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    /// Create a transport for the given service.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = client_builder(&config).build().map_err(AppError::http)?;
        Ok(Self { client, config })
    }

    fn prepare(&self, request: &ApiRequest) -> RequestBuilder {
        let url = self.config.api_url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        builder = builder.bearer_auth(&self.config.token);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder
    }

    /// Send the request and check the status, logging failed bodies.
    async fn execute(
        &self,
        request: &ApiRequest,
        builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        tracing::debug!(method = ?request.method, path = %request.path, "Sending request");
        let start = Instant::now();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            result = builder.send() => result.map_err(AppError::http)?,
        };

        let status = response.status();
        let duration_ms = start.elapsed().as_millis();

        if status.as_u16() >= 299 {
            let body = read_body(response, cancel).await?;
            tracing::error!(
                method = ?request.method,
                path = %request.path,
                status = status.as_u16(),
                duration_ms,
                body = %String::from_utf8_lossy(&body),
                "Request failed"
            );
            return Err(AppError::RequestFailed {
                status: status.as_u16(),
            });
        }

        tracing::debug!(
            method = ?request.method,
            path = %request.path,
            status = status.as_u16(),
            duration_ms,
            "Request completed"
        );

        Ok(response)
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Bytes> {
        let builder = self.prepare(request).timeout(self.config.request_timeout);
        let response = self.execute(request, builder, cancel).await?;
        read_body(response, cancel).await
    }

    async fn open_stream(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let builder = self.prepare(request);
        let response = self.execute(request, builder, cancel).await?;

        if let Some(length) = response.content_length() {
            tracing::debug!(bytes = length, "Streaming response body");
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::http));
        Ok(Box::pin(stream))
    }
}

fn client_builder(config: &ClientConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.connect_timeout)
}

async fn read_body(response: Response, cancel: &CancellationToken) -> Result<Bytes> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AppError::Cancelled),
        body = response.bytes() => body.map_err(AppError::http),
    }
}

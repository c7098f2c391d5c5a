//! Application layer - use cases and orchestration.
//!
//! Job client and poller on top of the transport, archive extraction, and
//! the export run that ties them together.

pub mod client;
pub mod export_service;
pub mod extractor;
pub mod formatter;
pub mod poller;
pub mod sanitize;

pub use client::JobClient;
pub use export_service::ExportService;
pub use formatter::{format_jobs_table, format_outcome};

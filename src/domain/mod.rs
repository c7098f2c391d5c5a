//! Domain layer - core types and errors.
//!
//! This layer contains the data model of Outline file operations,
//! configuration values and the shared error type.

pub mod config;
pub mod error;
pub mod models;

pub use config::{ClientConfig, ExportConfig, FileConfig, PollConfig, USER_AGENT};
pub use error::{AppError, Result};
pub use models::{ExportFormat, FileOperation, FileOperationState, Pagination};

//! Infrastructure layer - external adapters (HTTP, filesystem).
//!
//! This layer handles all network I/O and configuration files.

pub mod config;
pub mod http;
#[cfg(test)]
pub mod mock;

pub use config::load_config;
pub use http::{ApiRequest, ByteStream, ReqwestTransport, Transport};

//! Configuration file loading.
//!
//! Reads the optional TOML configuration file.

use std::fs;
use std::path::Path;

use crate::domain::{AppError, FileConfig, Result};

/// Load configuration from an explicit path, or from the default location.
///
/// An explicit path must exist; the default file is optional.
///
/// # Errors
/// Returns error if a file exists but cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_config_from_file(path);
    }

    match FileConfig::default_path() {
        Some(path) if path.exists() => load_config_from_file(&path),
        _ => Ok(FileConfig::default()),
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    let config = toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file {}: {e}", path.display()),
    })?;

    tracing::debug!(path = %path.display(), "Loaded configuration");

    Ok(config)
}

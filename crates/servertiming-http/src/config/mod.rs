//! Service config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use servertiming_core::error::{Result, TimingsError};

pub use schema::{AppConfig, ServerSection, TimingsSection};

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| TimingsError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<AppConfig> {
    let cfg: AppConfig = serde_yaml::from_str(s)
        .map_err(|e| TimingsError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load `path`, or fall back to defaults when the file does not exist.
pub fn load_or_default(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        return load_from_file(path);
    }
    tracing::info!(path, "config file not found, using defaults");
    let cfg = AppConfig::default();
    cfg.validate()?;
    Ok(cfg)
}

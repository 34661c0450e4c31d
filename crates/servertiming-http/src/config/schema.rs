use std::net::SocketAddr;

use axum::http::HeaderName;
use serde::Deserialize;
use servertiming_core::error::{Result, TimingsError};
use servertiming_core::HEADER_NAME;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub timings: TimingsSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSection::default(),
            timings: TimingsSection::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(TimingsError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.server.validate()?;
        self.timings.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            TimingsError::BadConfig(format!("server.listen must be a socket address: {e}"))
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingsSection {
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Name of the whole-request metric; `null` disables it.
    #[serde(default = "default_request_metric")]
    pub request_metric: Option<String>,

    #[serde(default = "default_emit_log")]
    pub emit_log: bool,
}

impl Default for TimingsSection {
    fn default() -> Self {
        Self {
            header_name: default_header_name(),
            request_metric: default_request_metric(),
            emit_log: default_emit_log(),
        }
    }
}

impl TimingsSection {
    pub fn validate(&self) -> Result<()> {
        HeaderName::from_bytes(self.header_name.as_bytes()).map_err(|_| {
            TimingsError::BadConfig(format!(
                "timings.header_name is not a valid header name: {}",
                self.header_name
            ))
        })?;
        if let Some(name) = &self.request_metric {
            if name.trim().is_empty() {
                return Err(TimingsError::BadConfig(
                    "timings.request_metric must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_header_name() -> String {
    HEADER_NAME.into()
}
fn default_request_metric() -> Option<String> {
    Some("request".into())
}
fn default_emit_log() -> bool {
    true
}

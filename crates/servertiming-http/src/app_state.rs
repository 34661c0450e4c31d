//! Shared application state.

use std::sync::Arc;

use axum::http::HeaderName;

use servertiming_core::error::{Result, TimingsError};

use crate::config::{AppConfig, TimingsSection};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: AppConfig,
    header_name: HeaderName,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: AppConfig) -> Result<Self> {
        cfg.validate()?;
        let header_name = HeaderName::from_bytes(cfg.timings.header_name.as_bytes())
            .map_err(|e| TimingsError::BadConfig(format!("timings.header_name: {e}")))?;

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, header_name }),
        })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.inner.cfg
    }

    pub fn timings(&self) -> &TimingsSection {
        &self.inner.cfg.timings
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.inner.header_name
    }
}

//! Top-level facade crate for servertiming.
//!
//! Re-exports core types and the http library so users can depend on a single crate.

pub mod core {
    pub use servertiming_core::*;
}

pub mod http {
    pub use servertiming_http::*;
}

pub use servertiming_core::{Metric, MetricCollection, TimingsError};
pub use servertiming_http::{storage, BindMode};

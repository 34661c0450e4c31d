//! servertiming core: metrics, per-request collections and the
//! `Server-Timing` wire format.
//!
//! This crate carries no runtime or web-framework dependencies. Scope
//! management (which collection belongs to the current request) lives in
//! `servertiming-http`; here collections are always passed explicitly.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `TimingsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod collection;
pub mod error;
pub mod header;
pub mod metric;

pub use collection::MetricCollection;
/// Shared result type.
pub use error::{ErrorCode, Result, TimingsError};
pub use header::{RequestLog, TimingRecord, HEADER_NAME};
pub use metric::{DurationMode, Measurement, Metric};

//! servertiming http library entry.
//!
//! This crate owns request scoping (context storage and hand-off helpers),
//! the instrumentation API used by application code, and the axum middleware
//! that turns a request's metrics into a `Server-Timing` header and one
//! structured log line. It is consumed by the demo binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod error;
pub mod instrument;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod storage;

pub use instrument::{metric, record, timed, timed_async, timed_async_fn, timed_fn};
pub use storage::{bind, cleanup, BindMode, Scope};

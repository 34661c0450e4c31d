//! Axum middleware driving the per-request timing lifecycle.
//!
//! For every request:
//! 1. open a task context and bind an async scope
//! 2. optionally measure the whole handler as the `request` metric
//! 3. attach the `Server-Timing` header when the collection is not empty
//! 4. log `{"path", "timings"}` once, clear the collection, release the scope
//!
//! Mount with `axum::middleware::from_fn_with_state(state, server_timing)`.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use servertiming_core::{Metric, MetricCollection, RequestLog};

use crate::app_state::AppState;
use crate::storage::{self, BindMode};

/// `tracing` target of the per-request dump.
pub const LOG_TARGET: &str = "servertiming";

pub async fn server_timing(State(app): State<AppState>, req: Request, next: Next) -> Response {
    storage::with_task_context(track_request(app, req, next)).await
}

async fn track_request(app: AppState, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();

    let scope = match storage::bind(BindMode::Async) {
        Ok(scope) => scope,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, %path, "failed to bind timing scope");
            return next.run(req).await;
        }
    };
    let collection = scope.collection();

    let request_metric = app
        .timings()
        .request_metric
        .as_deref()
        .map(|name| Metric::create(name, Some(""), None, Some(&collection)));
    let measurement = match request_metric.as_ref().map(Metric::measure_scope) {
        Some(Ok(m)) => Some(m),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "request metric not started");
            None
        }
        None => None,
    };

    let mut response = next.run(req).await;
    drop(measurement);

    if let Some(value) = collection.header_value() {
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                response.headers_mut().insert(app.header_name().clone(), v);
            }
            Err(e) => tracing::error!(error = %e, %path, %value, "timing header value rejected"),
        }
        if app.timings().emit_log {
            log_timings(&path, &collection);
        }
    }

    collection.clear();
    storage::cleanup();
    response
}

fn log_timings(path: &str, collection: &MetricCollection) {
    let timings = collection.dump();
    match (RequestLog { path, timings: &timings }).to_json() {
        Ok(record) => tracing::info!(target: LOG_TARGET, %path, %record, "server timings"),
        Err(e) => tracing::warn!(target: LOG_TARGET, %path, error = %e, "server timings not encoded"),
    }
}

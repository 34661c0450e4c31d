//! Demo handlers exercising each instrumentation style.

use std::time::Duration;

use servertiming_core::TimingsError;

use crate::error::AppError;
use crate::instrument::{metric, record, timed, timed_async, timed_fn};
use crate::storage;

/// Scoped async measurement around a suspended future.
pub async fn home() -> Result<&'static str, AppError> {
    timed_async("render", Some("home"), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
    })
    .await?;
    Ok("ok")
}

/// Preset duration plus a function measured under its own name.
pub async fn db() -> Result<String, AppError> {
    record("db query", Some("select"), 12.345)?;
    let rows = timed_fn(None, None, load_rows)?;
    Ok(format!("{rows} rows"))
}

/// Work handed to the blocking pool; both sides land in one collection.
pub async fn blocking() -> Result<String, AppError> {
    let handoff = metric("handoff", Some("blocking pool"))?;
    handoff.start()?;

    let sum = storage::spawn_blocking(|| {
        timed("worker", None, || {
            std::thread::sleep(Duration::from_millis(2));
            (1..=100u64).sum::<u64>()
        })
    })
    .await
    .map_err(|e| TimingsError::Internal(format!("worker failed: {e}")))??;

    handoff.end()?;
    Ok(format!("sum={sum}"))
}

/// Ends a metric that was never started: fails with INVALID_STATE.
pub async fn fail() -> Result<&'static str, AppError> {
    let m = metric("broken", None)?;
    m.end()?;
    Ok("unreachable")
}

/// Records nothing.
pub async fn quiet() -> &'static str {
    "quiet"
}

fn load_rows() -> usize {
    std::hint::black_box(42)
}

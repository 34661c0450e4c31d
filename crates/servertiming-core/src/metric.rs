//! A single `Server-Timing` entry.
//!
//! A metric either carries a preset duration or measures one between
//! `start()` and `end()` on the monotonic clock. Metrics are cheap handles:
//! the owning [`MetricCollection`] keeps clones, the metric only keeps a weak
//! back-reference to it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use parking_lot::Mutex;

use crate::collection::{CollectionInner, MetricCollection};
use crate::error::{Result, TimingsError};
use crate::header;

/// How a metric obtains its duration. Never both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationMode {
    /// Fixed duration in milliseconds, known at construction.
    Preset(f64),
    /// Measured on the monotonic clock. `start == None` means not started yet.
    Measured {
        start: Option<Instant>,
        end: Option<Instant>,
    },
}

impl DurationMode {
    fn millis(&self) -> f64 {
        match *self {
            DurationMode::Preset(ms) => ms,
            DurationMode::Measured { start: None, .. } => 0.0,
            DurationMode::Measured {
                start: Some(start),
                end,
            } => {
                let end = end.unwrap_or_else(Instant::now);
                end.saturating_duration_since(start).as_secs_f64() * 1000.0
            }
        }
    }
}

struct MetricInner {
    name: String,
    description: Mutex<Option<String>>,
    mode: Mutex<DurationMode>,
    // Set once, either at construction or by the first `append`.
    owner: OnceLock<Weak<CollectionInner>>,
}

/// Handle to a timing metric. Clones share the same underlying record.
#[derive(Clone)]
pub struct Metric {
    inner: Arc<MetricInner>,
}

impl Metric {
    /// Create a detached, not yet started measured metric.
    pub fn new(name: &str, description: Option<&str>) -> Self {
        Self::build(name, description, None, None)
    }

    /// Create a metric, optionally owned by `collection`.
    ///
    /// With a preset duration the metric is appended to `collection` right
    /// away and can no longer be started or ended. Without a collection a
    /// preset metric stays detached.
    pub fn create(
        name: &str,
        description: Option<&str>,
        preset_ms: Option<f64>,
        collection: Option<&MetricCollection>,
    ) -> Self {
        let metric = Self::build(name, description, preset_ms, collection);
        if preset_ms.is_some() {
            if let Some(c) = collection {
                c.push_owned(metric.clone());
            }
        }
        metric
    }

    fn build(
        name: &str,
        description: Option<&str>,
        preset_ms: Option<f64>,
        collection: Option<&MetricCollection>,
    ) -> Self {
        let owner = OnceLock::new();
        if let Some(c) = collection {
            let _ = owner.set(c.downgrade());
        }
        let mode = match preset_ms {
            Some(ms) => DurationMode::Preset(ms),
            None => DurationMode::Measured {
                start: None,
                end: None,
            },
        };
        Self {
            inner: Arc::new(MetricInner {
                name: normalize_name(name),
                description: Mutex::new(description.map(str::to_owned)),
                mode: Mutex::new(mode),
                owner,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> Option<String> {
        self.inner.description.lock().clone()
    }

    /// Replace the description. Allowed on preset metrics as well.
    pub fn set_description(&self, description: Option<&str>) {
        *self.inner.description.lock() = description.map(str::to_owned);
    }

    pub fn mode(&self) -> DurationMode {
        *self.inner.mode.lock()
    }

    /// Collection this metric is registered into, if it is still alive.
    pub fn owner(&self) -> Option<MetricCollection> {
        self.inner
            .owner
            .get()
            .and_then(Weak::upgrade)
            .map(MetricCollection::from_inner)
    }

    /// Start measuring and register into the owning collection.
    pub fn start(&self) -> Result<()> {
        {
            let mut mode = self.inner.mode.lock();
            match *mode {
                DurationMode::Preset(_) => {
                    return Err(TimingsError::InvalidState(
                        "cannot start a metric with a preset duration",
                    ))
                }
                DurationMode::Measured { start: Some(_), .. } => {
                    return Err(TimingsError::InvalidState("metric already started"))
                }
                DurationMode::Measured { start: None, .. } => {
                    *mode = DurationMode::Measured {
                        start: Some(Instant::now()),
                        end: None,
                    };
                }
            }
        }

        match self.owner() {
            Some(c) => c.push_owned(self.clone()),
            None if self.inner.owner.get().is_some() => {
                tracing::debug!(metric = %self.name(), "owning collection already released");
            }
            None => {}
        }
        Ok(())
    }

    /// Stop measuring. Ending again moves the end mark forward.
    pub fn end(&self) -> Result<()> {
        let mut mode = self.inner.mode.lock();
        match *mode {
            DurationMode::Preset(_) => Err(TimingsError::InvalidState(
                "cannot end a metric with a preset duration",
            )),
            DurationMode::Measured { start: None, .. } => Err(TimingsError::InvalidState(
                "cannot end a metric that has not been started",
            )),
            DurationMode::Measured {
                start: Some(start), ..
            } => {
                *mode = DurationMode::Measured {
                    start: Some(start),
                    end: Some(Instant::now()),
                };
                Ok(())
            }
        }
    }

    fn end_if_running(&self) {
        let mut mode = self.inner.mode.lock();
        if let DurationMode::Measured {
            start: Some(start),
            end: None,
        } = *mode
        {
            *mode = DurationMode::Measured {
                start: Some(start),
                end: Some(Instant::now()),
            };
        }
    }

    /// Duration in milliseconds.
    ///
    /// Preset value if any, elapsed-so-far for a running metric, `0.0` if the
    /// metric was never started.
    pub fn duration(&self) -> f64 {
        self.inner.mode.lock().millis()
    }

    /// `Server-Timing` entry for this metric.
    pub fn format(&self) -> String {
        let description = self.description();
        header::format_entry(self.name(), description.as_deref(), self.duration())
    }

    /// Snapshot used for structured logging.
    pub fn record(&self) -> header::TimingRecord {
        header::TimingRecord {
            name: self.name().to_owned(),
            description: self.description(),
            duration: self.duration(),
        }
    }

    /// Start now and end when the returned guard is dropped.
    pub fn measure_scope(&self) -> Result<Measurement> {
        self.start()?;
        Ok(Measurement {
            metric: self.clone(),
        })
    }

    /// Measure a closure. The metric is ended on return and on unwinding.
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let _m = self.measure_scope()?;
        Ok(f())
    }

    /// Measure a future, suspended time included. Dropping the future ends the metric.
    pub async fn measure_async<F: Future>(&self, fut: F) -> Result<F::Output> {
        let _m = self.measure_scope()?;
        Ok(fut.await)
    }

    pub(crate) fn claim_owner(&self, collection: &MetricCollection) -> Result<()> {
        let owner = self
            .inner
            .owner
            .get_or_init(|| collection.downgrade());
        if Weak::ptr_eq(owner, &collection.downgrade()) {
            Ok(())
        } else {
            Err(TimingsError::OwnershipConflict(self.inner.name.clone()))
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.inner.name)
            .field("description", &self.description())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Guard returned by [`Metric::measure_scope`].
#[must_use = "the metric is ended as soon as the guard is dropped"]
#[derive(Debug)]
pub struct Measurement {
    metric: Metric,
}

impl Measurement {
    pub fn metric(&self) -> &Metric {
        &self.metric
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.metric.end_if_running();
    }
}

/// Names are written unquoted into the header: whitespace, control
/// characters, non-ASCII and the `,` `;` `"` delimiters all become `-`.
fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ',' | ';' | '"' => '-',
            c if c.is_whitespace() || c.is_control() || !c.is_ascii() => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use std::thread::sleep;
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn name_whitespace_becomes_dash() {
        let m = Metric::new("db query\tslow", None);
        assert_eq!(m.name(), "db-query-slow");
    }

    #[test]
    fn name_delimiters_and_control_bytes_are_replaced() {
        assert_eq!(Metric::new("cache,db;x", None).name(), "cache-db-x");
        assert_eq!(Metric::new("del\u{7f}", None).name(), "del-");
        assert_eq!(Metric::new("say\"hi\"", None).name(), "say-hi-");
        assert_eq!(Metric::new("größe", None).name(), "gr--e");

        let c = MetricCollection::new();
        Metric::create("cache,db;x", None, Some(1.0), Some(&c));
        Metric::create("del\u{7f}", None, Some(2.0), Some(&c));
        assert_eq!(
            c.header_value().as_deref(),
            Some("cache-db-x;dur=1.00;, del-;dur=2.00;")
        );
    }

    #[test]
    fn preset_formats_with_two_decimals_and_is_immutable() {
        let c = MetricCollection::new();
        let m = Metric::create("cache", Some("hit"), Some(50.0), Some(&c));
        assert_eq!(m.format(), "cache;desc=\"hit\";dur=50.00;");
        assert_eq!(c.len(), 1);

        let err = m.start().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        let err = m.end().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);
        assert_eq!(m.duration(), 50.0);
    }

    #[test]
    fn preset_description_can_still_change() {
        let m = Metric::create("db", None, Some(1.0), None);
        m.set_description(Some("select"));
        assert_eq!(m.format(), "db;desc=\"select\";dur=1.00;");
    }

    #[test]
    fn never_started_reports_zero_and_omits_dur() {
        let m = Metric::new("idle", None);
        assert_eq!(m.duration(), 0.0);
        assert_eq!(m.format(), "idle;");
    }

    #[test]
    fn end_before_start_is_rejected() {
        let m = Metric::new("x", None);
        assert_eq!(
            m.end(),
            Err(TimingsError::InvalidState(
                "cannot end a metric that has not been started"
            ))
        );
    }

    #[test]
    fn double_start_is_rejected() {
        let m = Metric::new("x", None);
        m.start().unwrap();
        assert_eq!(m.start().unwrap_err().code(), ErrorCode::InvalidState);
    }

    #[test]
    fn running_duration_grows_until_end() {
        let m = Metric::new("work", None);
        m.start().unwrap();
        let first = m.duration();
        assert!(first > 0.0);
        sleep(Duration::from_millis(2));
        let second = m.duration();
        assert!(second >= first);

        m.end().unwrap();
        let frozen = m.duration();
        sleep(Duration::from_millis(2));
        assert_eq!(m.duration(), frozen);
        assert!(frozen >= 2.0);
    }

    #[test]
    fn start_registers_into_owner_once() {
        let c = MetricCollection::new();
        let m = Metric::create("render", None, None, Some(&c));
        assert!(c.is_empty());
        m.start().unwrap();
        assert_eq!(c.len(), 1);
        m.end().unwrap();
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn measure_ends_on_panic() {
        let m = Metric::new("boom", None);
        let m2 = m.clone();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _ = m2.measure(|| panic!("handler failed"));
        }));
        assert!(res.is_err());
        match m.mode() {
            DurationMode::Measured {
                start: Some(_),
                end: Some(_),
            } => {}
            other => panic!("metric left running: {other:?}"),
        }
    }

    #[test]
    fn measure_ends_on_early_return() {
        fn work(m: &Metric) -> std::result::Result<u32, &'static str> {
            let _g = m.measure_scope().map_err(|_| "start")?;
            if m.name() == "early" {
                return Err("early");
            }
            Ok(1)
        }

        let m = Metric::new("early", None);
        assert!(work(&m).is_err());
        assert!(matches!(
            m.mode(),
            DurationMode::Measured { end: Some(_), .. }
        ));
    }

    #[test]
    fn manual_end_is_kept_by_guard() {
        let m = Metric::new("manual", None);
        let g = m.measure_scope().unwrap();
        m.end().unwrap();
        let ended = m.mode();
        sleep(Duration::from_millis(1));
        drop(g);
        assert_eq!(m.mode(), ended);
    }
}

//! Ordered, append-only metric store for one logical request.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::header::{self, TimingRecord};
use crate::metric::Metric;

#[derive(Default)]
pub(crate) struct CollectionInner {
    metrics: Mutex<Vec<Metric>>,
}

/// Per-request metric collection. Insertion order is display order.
///
/// Cloning yields another handle to the same collection.
#[derive(Clone, Default)]
pub struct MetricCollection {
    inner: Arc<CollectionInner>,
}

impl MetricCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_inner(inner: Arc<CollectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<CollectionInner> {
        Arc::downgrade(&self.inner)
    }

    /// Skips the ownership check; only for metrics that already name `self`.
    pub(crate) fn push_owned(&self, metric: Metric) {
        self.inner.metrics.lock().push(metric);
    }

    /// Append a metric. A detached metric is adopted by this collection.
    pub fn append(&self, metric: &Metric) -> Result<()> {
        metric.claim_owner(self)?;
        self.push_owned(metric.clone());
        Ok(())
    }

    /// Snapshot of the metrics, in insertion order.
    pub fn all(&self) -> Vec<Metric> {
        self.inner.metrics.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.metrics.lock().is_empty()
    }

    /// Drop every metric from the list. Handles held elsewhere stay valid.
    pub fn clear(&self) {
        self.inner.metrics.lock().clear();
    }

    /// Structured records for logging, in insertion order.
    pub fn dump(&self) -> Vec<TimingRecord> {
        self.all().iter().map(Metric::record).collect()
    }

    /// Joined `Server-Timing` value, `None` when there is nothing to report.
    pub fn header_value(&self) -> Option<String> {
        header::join_entries(self.all().iter().map(Metric::format))
    }

    /// Whether both handles point at the same collection.
    pub fn same_as(&self, other: &MetricCollection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MetricCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricCollection")
            .field("metrics", &self.all())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::TimingsError;

    #[test]
    fn dump_keeps_creation_order() {
        let c = MetricCollection::new();
        for i in 0..5 {
            Metric::create(&format!("m{i}"), None, Some(f64::from(i) + 1.0), Some(&c));
        }
        let names: Vec<String> = c.dump().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn no_deduplication() {
        let c = MetricCollection::new();
        let m = Metric::new("twice", None);
        c.append(&m).unwrap();
        c.append(&m).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn append_rejects_foreign_metric() {
        let a = MetricCollection::new();
        let b = MetricCollection::new();
        let m = Metric::create("owned", None, Some(1.0), Some(&a));
        assert_eq!(
            b.append(&m),
            Err(TimingsError::OwnershipConflict("owned".into()))
        );
        assert!(b.is_empty());
    }

    #[test]
    fn append_adopts_detached_metric() {
        let c = MetricCollection::new();
        let m = Metric::new("loose", None);
        assert!(m.owner().is_none());
        c.append(&m).unwrap();
        assert!(m.owner().unwrap().same_as(&c));
    }

    #[test]
    fn clear_keeps_metric_handles_usable() {
        let c = MetricCollection::new();
        let m = Metric::create("kept", Some("x"), Some(3.0), Some(&c));
        let formatted = m.format();
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.header_value(), None);
        assert_eq!(m.format(), formatted);
    }

    #[test]
    fn back_reference_does_not_keep_collection_alive() {
        let c = MetricCollection::new();
        let m = Metric::create("orphan", None, None, Some(&c));
        drop(c);
        assert!(m.owner().is_none());
        m.start().unwrap();
        m.end().unwrap();
    }
}

//! Metric taxonomy and the category-based inclusion filter (§4.J). Modeled
//! as nominal types with a small `kind` enum plus `name`/`description`
//! fields per DESIGN NOTES §9, rather than a class per metric.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The four metric shapes a sink accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Amount,
    Status,
    Interval,
}

/// A metric definition: `kind` plus identity, and the `category` tag the
/// filter matches against instead of walking an inheritance hierarchy.
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub kind: MetricKind,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

/// An opaque handle returned by `begin_interval`, passed back to
/// `end_interval`/`cancel_interval`. When a metric is filtered out, the sink
/// hands back `IntervalId::SENTINEL` so callers never have to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalId(u64);

impl IntervalId {
    pub const SENTINEL: IntervalId = IntervalId(u64::MAX);
}

/// The primitive operations every metric sink supports (§6).
pub trait MetricSink: Send + Sync {
    fn increment_counter(&self, metric: &MetricDefinition);
    fn add_amount(&self, metric: &MetricDefinition, amount: f64);
    fn set_status(&self, metric: &MetricDefinition, value: bool);
    fn begin_interval(&self, metric: &MetricDefinition) -> IntervalId;
    fn end_interval(&self, metric: &MetricDefinition, id: IntervalId);
    fn cancel_interval(&self, metric: &MetricDefinition, id: IntervalId);
}

/// A sink that does nothing; useful as a default when no metrics backend is
/// wired up.
#[derive(Debug, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn increment_counter(&self, _metric: &MetricDefinition) {}
    fn add_amount(&self, _metric: &MetricDefinition, _amount: f64) {}
    fn set_status(&self, _metric: &MetricDefinition, _value: bool) {}
    fn begin_interval(&self, _metric: &MetricDefinition) -> IntervalId {
        IntervalId::SENTINEL
    }
    fn end_interval(&self, _metric: &MetricDefinition, _id: IntervalId) {}
    fn cancel_interval(&self, _metric: &MetricDefinition, _id: IntervalId) {}
}

/// Decorator that only forwards metrics whose `category` is in the
/// configured inclusion set. Interval metrics that are filtered out still
/// hand back a real (if sentinel) id so `End`/`CancelBegin` calls downstream
/// never observe a mismatched id (§4.J).
pub struct MetricFilter {
    inner: Arc<dyn MetricSink>,
    included_categories: HashSet<&'static str>,
    next_interval_id: AtomicU64,
}

impl MetricFilter {
    pub fn new(inner: Arc<dyn MetricSink>, included_categories: HashSet<&'static str>) -> Self {
        Self {
            inner,
            included_categories,
            next_interval_id: AtomicU64::new(0),
        }
    }

    fn included(&self, metric: &MetricDefinition) -> bool {
        self.included_categories.contains(metric.category)
    }
}

impl MetricSink for MetricFilter {
    fn increment_counter(&self, metric: &MetricDefinition) {
        if self.included(metric) {
            self.inner.increment_counter(metric);
        }
    }

    fn add_amount(&self, metric: &MetricDefinition, amount: f64) {
        if self.included(metric) {
            self.inner.add_amount(metric, amount);
        }
    }

    fn set_status(&self, metric: &MetricDefinition, value: bool) {
        if self.included(metric) {
            self.inner.set_status(metric, value);
        }
    }

    fn begin_interval(&self, metric: &MetricDefinition) -> IntervalId {
        if self.included(metric) {
            self.inner.begin_interval(metric)
        } else {
            // Advance a local counter so filtered ids are distinguishable in
            // logs even though the inner sink never observes them.
            self.next_interval_id.fetch_add(1, Ordering::Relaxed);
            IntervalId::SENTINEL
        }
    }

    fn end_interval(&self, metric: &MetricDefinition, id: IntervalId) {
        if self.included(metric) && id != IntervalId::SENTINEL {
            self.inner.end_interval(metric, id);
        }
    }

    fn cancel_interval(&self, metric: &MetricDefinition, id: IntervalId) {
        if self.included(metric) && id != IntervalId::SENTINEL {
            self.inner.cancel_interval(metric, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        counters: AtomicUsize,
        begins: AtomicUsize,
    }

    impl MetricSink for CountingSink {
        fn increment_counter(&self, _metric: &MetricDefinition) {
            self.counters.fetch_add(1, Ordering::SeqCst);
        }
        fn add_amount(&self, _metric: &MetricDefinition, _amount: f64) {}
        fn set_status(&self, _metric: &MetricDefinition, _value: bool) {}
        fn begin_interval(&self, _metric: &MetricDefinition) -> IntervalId {
            self.begins.fetch_add(1, Ordering::SeqCst);
            IntervalId(1)
        }
        fn end_interval(&self, _metric: &MetricDefinition, _id: IntervalId) {}
        fn cancel_interval(&self, _metric: &MetricDefinition, _id: IntervalId) {}
    }

    const INCLUDED: MetricDefinition = MetricDefinition {
        kind: MetricKind::Counter,
        name: "writes",
        description: "write count",
        category: "writer",
    };

    const EXCLUDED: MetricDefinition = MetricDefinition {
        kind: MetricKind::Interval,
        name: "flush_latency",
        description: "flush latency",
        category: "buffer",
    };

    #[test]
    fn included_category_passes_through() {
        let inner = Arc::new(CountingSink::default());
        let filter = MetricFilter::new(inner.clone(), HashSet::from(["writer"]));
        filter.increment_counter(&INCLUDED);
        assert_eq!(inner.counters.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn excluded_category_is_dropped_but_begin_returns_usable_sentinel() {
        let inner = Arc::new(CountingSink::default());
        let filter = MetricFilter::new(inner.clone(), HashSet::from(["writer"]));
        let id = filter.begin_interval(&EXCLUDED);
        assert_eq!(id, IntervalId::SENTINEL);
        // Must not panic or forward to the inner sink.
        filter.end_interval(&EXCLUDED, id);
        filter.cancel_interval(&EXCLUDED, id);
        assert_eq!(inner.begins.load(Ordering::SeqCst), 0);
    }
}

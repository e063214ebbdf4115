//! Conversion of cumulative GC counters into exported increments.
//!
//! Space gauges are replaced on every sample. Counters are exported as the
//! difference to the previous snapshot of the same pid; the first snapshot of
//! a pid only establishes the baseline.

use tracing::{debug, warn};

use crate::metrics::GcMetrics;
use crate::snapshot::{GcCounters, GcSnapshot};
use crate::store::StateStore;

/// Increments between two counter snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDelta {
    /// Non-negative increments, regressions already clamped to zero.
    pub increments: GcCounters,
    /// Names of the counters that went backwards.
    pub regressed: Vec<&'static str>,
}

/// Result of applying one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No baseline existed; gauges were set and the baseline stored.
    FirstObservation,
    /// Counters were advanced; `regressed` counters contributed nothing.
    Updated { regressed: usize },
}

/// Computes `current - previous` per counter, clamping negative results.
pub fn counter_delta(previous: &GcCounters, current: &GcCounters) -> CounterDelta {
    let mut regressed = Vec::new();
    let mut diff = |name: &'static str, prev: f64, cur: f64| {
        if cur < prev {
            regressed.push(name);
            0.0
        } else {
            cur - prev
        }
    };

    let increments = GcCounters {
        young_gc_count: diff("young_gc_count", previous.young_gc_count, current.young_gc_count),
        young_gc_time: diff("young_gc_time", previous.young_gc_time, current.young_gc_time),
        full_gc_count: diff("full_gc_count", previous.full_gc_count, current.full_gc_count),
        full_gc_time: diff("full_gc_time", previous.full_gc_time, current.full_gc_time),
        total_gc_time: diff("total_gc_time", previous.total_gc_time, current.total_gc_time),
    };

    CounterDelta {
        increments,
        regressed,
    }
}

/// Publishes one successful sample of `pid` and makes it the new baseline.
pub fn apply(
    store: &StateStore,
    metrics: &GcMetrics,
    pid: u32,
    label: &str,
    snapshot: GcSnapshot,
) -> ApplyOutcome {
    metrics.set_gauges(pid, label, &snapshot.spaces);

    let Some(previous) = store.upsert(pid, snapshot) else {
        debug!("First sample for pid {} ({}), baseline stored", pid, label);
        return ApplyOutcome::FirstObservation;
    };

    let delta = counter_delta(&previous.counters, &snapshot.counters);
    for name in &delta.regressed {
        let (prev, cur) = lookup(&previous.counters, &snapshot.counters, name);
        warn!(
            "Counter {} of pid {} ({}) went backwards ({} -> {}), increment clamped to 0",
            name, pid, label, prev, cur
        );
    }

    metrics.add_counters(pid, label, &delta.increments);
    ApplyOutcome::Updated {
        regressed: delta.regressed.len(),
    }
}

fn lookup(previous: &GcCounters, current: &GcCounters, name: &str) -> (f64, f64) {
    let find = |counters: &GcCounters| {
        counters
            .named()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map_or(0.0, |(_, v)| v)
    };
    (find(previous), find(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    fn counters(ygc: f64, ygct: f64, fgc: f64, fgct: f64, gct: f64) -> GcCounters {
        GcCounters {
            young_gc_count: ygc,
            young_gc_time: ygct,
            full_gc_count: fgc,
            full_gc_time: fgct,
            total_gc_time: gct,
        }
    }

    #[test]
    fn test_delta_is_difference() {
        let delta = counter_delta(
            &counters(3.0, 0.5, 1.0, 0.25, 0.75),
            &counters(5.0, 1.0, 1.0, 0.5, 1.5),
        );
        assert_eq!(delta.increments, counters(2.0, 0.5, 0.0, 0.25, 0.75));
        assert!(delta.regressed.is_empty());
    }

    #[test]
    fn test_regression_clamps_to_zero() {
        let delta = counter_delta(
            &counters(10.0, 2.0, 1.0, 0.5, 2.5),
            &counters(4.0, 2.5, 0.0, 0.5, 3.0),
        );
        assert_eq!(delta.increments.young_gc_count, 0.0);
        assert_eq!(delta.increments.full_gc_count, 0.0);
        assert_eq!(delta.increments.young_gc_time, 0.5);
        assert_eq!(delta.regressed, vec!["young_gc_count", "full_gc_count"]);
    }

    #[test]
    fn test_apply_first_then_update() {
        let registry = Registry::new();
        let metrics = GcMetrics::new(&registry).unwrap();
        let store = StateStore::new();

        let mut first = GcSnapshot::default();
        first.spaces.eden_capacity = 512.0 * 1024.0;
        first.counters = counters(3.0, 0.05, 1.0, 0.2, 0.25);

        assert_eq!(
            apply(&store, &metrics, 101, "svc", first),
            ApplyOutcome::FirstObservation
        );
        assert_eq!(
            metrics.eden_capacity.with_label_values(&["101", "svc"]).get(),
            512.0 * 1024.0
        );
        assert_eq!(store.get(101), Some(first));

        let mut second = first;
        second.counters.young_gc_count = 5.0;
        assert_eq!(
            apply(&store, &metrics, 101, "svc", second),
            ApplyOutcome::Updated { regressed: 0 }
        );
        assert_eq!(
            metrics.young_gc_count.with_label_values(&["101", "svc"]).get(),
            2.0
        );
        assert_eq!(
            metrics.full_gc_count.with_label_values(&["101", "svc"]).get(),
            0.0
        );
        assert_eq!(store.get(101), Some(second));
    }

    #[test]
    fn test_apply_regression_keeps_new_baseline() {
        let registry = Registry::new();
        let metrics = GcMetrics::new(&registry).unwrap();
        let store = StateStore::new();

        let mut first = GcSnapshot::default();
        first.counters.young_gc_count = 10.0;
        apply(&store, &metrics, 7, "app", first);

        let mut reset = GcSnapshot::default();
        reset.counters.young_gc_count = 2.0;
        assert_eq!(
            apply(&store, &metrics, 7, "app", reset),
            ApplyOutcome::Updated { regressed: 1 }
        );
        assert_eq!(
            metrics.young_gc_count.with_label_values(&["7", "app"]).get(),
            0.0
        );

        let mut after = GcSnapshot::default();
        after.counters.young_gc_count = 6.0;
        apply(&store, &metrics, 7, "app", after);
        assert_eq!(
            metrics.young_gc_count.with_label_values(&["7", "app"]).get(),
            4.0
        );
    }
}

//! Prometheus metrics definitions for herakles-jvm-gc-exporter.
//!
//! This module defines the per-process GC gauges and counters as well as the
//! exporter's own cycle metrics, and the glue that removes every series of a
//! process once it has gone away.

use dashmap::DashMap;
use prometheus::{CounterVec, Gauge, GaugeVec, IntCounter, Opts, Registry};
use tracing::debug;

use crate::snapshot::{GcCounters, HeapSpaces};

const PREFIX: &str = "jvm_gc_";
const LABELS: &[&str] = &["pid", "app"];

fn gauge_vec(name: &str, help: &str) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(format!("{PREFIX}{name}"), help), LABELS)
}

fn counter_vec(name: &str, help: &str) -> prometheus::Result<CounterVec> {
    CounterVec::new(Opts::new(format!("{PREFIX}{name}"), help), LABELS)
}

/// Per-process JVM GC metrics, labelled by `pid` and `app`.
pub struct GcMetrics {
    pub s0_capacity: GaugeVec,
    pub s1_capacity: GaugeVec,
    pub s0_usage: GaugeVec,
    pub s1_usage: GaugeVec,
    pub eden_capacity: GaugeVec,
    pub eden_usage: GaugeVec,
    pub old_capacity: GaugeVec,
    pub old_usage: GaugeVec,
    pub metaspace_capacity: GaugeVec,
    pub metaspace_usage: GaugeVec,
    pub class_capacity: GaugeVec,
    pub class_usage: GaugeVec,

    pub young_gc_count: CounterVec,
    pub young_gc_time: CounterVec,
    pub full_gc_count: CounterVec,
    pub full_gc_time: CounterVec,
    pub total_gc_time: CounterVec,

    // App label each pid is currently exported under.
    series: DashMap<u32, String>,
}

impl GcMetrics {
    /// Creates and registers all GC metrics with the registry.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            s0_capacity: gauge_vec("s0_capacity_bytes", "Survivor space 0 capacity in bytes")?,
            s1_capacity: gauge_vec("s1_capacity_bytes", "Survivor space 1 capacity in bytes")?,
            s0_usage: gauge_vec("s0_usage_bytes", "Survivor space 0 usage in bytes")?,
            s1_usage: gauge_vec("s1_usage_bytes", "Survivor space 1 usage in bytes")?,
            eden_capacity: gauge_vec("eden_capacity_bytes", "Eden space capacity in bytes")?,
            eden_usage: gauge_vec("eden_usage_bytes", "Eden space usage in bytes")?,
            old_capacity: gauge_vec("old_gen_capacity_bytes", "Old generation capacity in bytes")?,
            old_usage: gauge_vec("old_gen_usage_bytes", "Old generation usage in bytes")?,
            metaspace_capacity: gauge_vec("metaspace_capacity_bytes", "Metaspace capacity in bytes")?,
            metaspace_usage: gauge_vec("metaspace_usage_bytes", "Metaspace usage in bytes")?,
            class_capacity: gauge_vec(
                "compressed_class_capacity_bytes",
                "Compressed class space capacity in bytes",
            )?,
            class_usage: gauge_vec(
                "compressed_class_usage_bytes",
                "Compressed class space usage in bytes",
            )?,
            young_gc_count: counter_vec("young_gc_count", "Number of young generation collections")?,
            young_gc_time: counter_vec(
                "young_gc_time_seconds",
                "Time spent in young generation collections",
            )?,
            full_gc_count: counter_vec("full_gc_count", "Number of full collections")?,
            full_gc_time: counter_vec("full_gc_time_seconds", "Time spent in full collections")?,
            total_gc_time: counter_vec("total_gc_time_seconds", "Total time spent in garbage collection")?,
            series: DashMap::new(),
        };

        for gauge in metrics.gauges() {
            registry.register(Box::new(gauge.clone()))?;
        }
        for counter in metrics.counters() {
            registry.register(Box::new(counter.clone()))?;
        }

        Ok(metrics)
    }

    fn gauges(&self) -> [&GaugeVec; 12] {
        [
            &self.s0_capacity,
            &self.s1_capacity,
            &self.s0_usage,
            &self.s1_usage,
            &self.eden_capacity,
            &self.eden_usage,
            &self.old_capacity,
            &self.old_usage,
            &self.metaspace_capacity,
            &self.metaspace_usage,
            &self.class_capacity,
            &self.class_usage,
        ]
    }

    fn counters(&self) -> [&CounterVec; 5] {
        [
            &self.young_gc_count,
            &self.young_gc_time,
            &self.full_gc_count,
            &self.full_gc_time,
            &self.total_gc_time,
        ]
    }

    /// Records `app` as the label of `pid`. Series exported under a
    /// previous label of the same pid are dropped so one pid never carries
    /// two gauge values.
    fn track(&self, pid: u32, app: &str) {
        let mut current = self.series.entry(pid).or_insert_with(|| app.to_string());
        if current.as_str() == app {
            return;
        }
        let stale = std::mem::replace(&mut *current, app.to_string());
        drop(current);

        let removed = self.remove_series(pid, &stale);
        debug!(
            "App label of pid {} changed from {} to {}, {} stale series removed",
            pid, stale, app, removed
        );
    }

    fn remove_series(&self, pid: u32, app: &str) -> usize {
        let pid_str = pid.to_string();
        let labels = &[pid_str.as_str(), app];
        let mut removed = 0;
        for gauge in self.gauges() {
            if gauge.remove_label_values(labels).is_ok() {
                removed += 1;
            }
        }
        for counter in self.counters() {
            if counter.remove_label_values(labels).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Replaces all space gauges of a process with the sampled values.
    pub fn set_gauges(&self, pid: u32, app: &str, spaces: &HeapSpaces) {
        self.track(pid, app);
        let pid_str = pid.to_string();
        let labels = &[pid_str.as_str(), app];

        let values = [
            spaces.s0_capacity,
            spaces.s1_capacity,
            spaces.s0_usage,
            spaces.s1_usage,
            spaces.eden_capacity,
            spaces.eden_usage,
            spaces.old_capacity,
            spaces.old_usage,
            spaces.metaspace_capacity,
            spaces.metaspace_usage,
            spaces.class_capacity,
            spaces.class_usage,
        ];
        for (gauge, value) in self.gauges().into_iter().zip(values) {
            gauge.with_label_values(labels).set(value);
        }
    }

    /// Adds non-negative increments to the collection counters of a process.
    pub fn add_counters(&self, pid: u32, app: &str, increments: &GcCounters) {
        self.track(pid, app);
        let pid_str = pid.to_string();
        let labels = &[pid_str.as_str(), app];

        let values = [
            increments.young_gc_count,
            increments.young_gc_time,
            increments.full_gc_count,
            increments.full_gc_time,
            increments.total_gc_time,
        ];
        for (counter, value) in self.counters().into_iter().zip(values) {
            counter.with_label_values(labels).inc_by(value);
        }
    }

    /// Drops every series carrying `pid`.
    /// Returns the number of series removed.
    pub fn remove_process(&self, pid: u32) -> usize {
        match self.series.remove(&pid) {
            Some((_, app)) => self.remove_series(pid, &app),
            None => 0,
        }
    }

    /// Number of processes with at least one exported series.
    pub fn tracked_processes(&self) -> usize {
        self.series.len()
    }
}

/// Self-monitoring metrics of the collection loop.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub cycle_duration: Gauge,
    pub monitored_processes: Gauge,
    pub last_cycle_success: Gauge,
    pub sample_failures: IntCounter,
    pub evicted_processes: IntCounter,
    pub cycles_skipped: IntCounter,
}

impl ExporterMetrics {
    /// Creates and registers the exporter metrics with the registry.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let cycle_duration = Gauge::new(
            "jvm_gc_exporter_cycle_duration_seconds",
            "Time spent in the last collection cycle",
        )?;
        let monitored_processes = Gauge::new(
            "jvm_gc_exporter_monitored_processes",
            "Number of JVM processes in the last live set",
        )?;
        let last_cycle_success = Gauge::new(
            "jvm_gc_exporter_last_cycle_success",
            "Whether the last collection cycle completed (1) or was aborted (0)",
        )?;
        let sample_failures = IntCounter::new(
            "jvm_gc_exporter_sample_failures_total",
            "Number of failed per-process samples",
        )?;
        let evicted_processes = IntCounter::new(
            "jvm_gc_exporter_evicted_processes_total",
            "Number of processes whose state and series were removed",
        )?;
        let cycles_skipped = IntCounter::new(
            "jvm_gc_exporter_cycles_skipped_total",
            "Number of cycles skipped because the previous one was still running",
        )?;

        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(monitored_processes.clone()))?;
        registry.register(Box::new(last_cycle_success.clone()))?;
        registry.register(Box::new(sample_failures.clone()))?;
        registry.register(Box::new(evicted_processes.clone()))?;
        registry.register(Box::new(cycles_skipped.clone()))?;

        Ok(Self {
            cycle_duration,
            monitored_processes,
            last_cycle_success,
            sample_failures,
            evicted_processes,
            cycles_skipped,
        })
    }
}

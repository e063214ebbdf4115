//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the background collection task.

use herakles_jvm_gc_exporter::{
    ConfigStore, CycleError, ExporterMetrics, GcCollector, HealthStats,
};
use prometheus::Registry;
use std::sync::Arc;
use tracing::{error, warn};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub collector: Arc<GcCollector>,
    pub exporter_metrics: ExporterMetrics,
    pub config: Arc<ConfigStore>,
    pub health_stats: Arc<HealthStats>,
}

impl AppState {
    /// Runs one collection cycle and records its outcome.
    pub async fn collect(&self) {
        match self.collector.run_cycle().await {
            Ok(report) => {
                let m = &self.exporter_metrics;
                m.cycle_duration.set(report.duration.as_secs_f64());
                m.monitored_processes.set(report.live as f64);
                m.last_cycle_success.set(1.0);
                m.sample_failures.inc_by(report.failed as u64);
                m.evicted_processes.inc_by(report.evicted as u64);
                self.health_stats.record_cycle(&report);
            }
            Err(CycleError::AlreadyRunning) => {
                warn!("Previous collection cycle still running, skipping this one");
                self.exporter_metrics.cycles_skipped.inc();
            }
            Err(e) => {
                error!("Collection cycle aborted: {}", e);
                self.exporter_metrics.last_cycle_success.set(0.0);
                self.health_stats.record_abort(&e.to_string());
            }
        }
    }
}

//! Running statistics about collection cycles, rendered by `/health`.

use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::collector::CycleReport;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min).
    fn snapshot(&self) -> (f64, f64, f64, f64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        }
    }
}

/// Outcome of the most recent cycle attempt.
#[derive(Debug, Clone)]
pub struct LastCycle {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregated cycle statistics since startup.
pub struct HealthStats {
    live_processes: Stat,
    sampled_processes: Stat,
    failed_samples: Stat,
    cycle_duration_seconds: Stat,
    total_cycles: AtomicU64,
    aborted_cycles: AtomicU64,
    http_requests: AtomicU64,
    last_cycle: Mutex<Option<LastCycle>>,
    started: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Self {
            live_processes: Stat::default(),
            sampled_processes: Stat::default(),
            failed_samples: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            total_cycles: AtomicU64::new(0),
            aborted_cycles: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            last_cycle: Mutex::new(None),
            started: Instant::now(),
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.live_processes.add_sample(report.live as f64);
        self.sampled_processes.add_sample(report.sampled as f64);
        self.failed_samples.add_sample(report.failed as f64);
        self.cycle_duration_seconds
            .add_sample(report.duration.as_secs_f64());
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.set_last(true, None);
    }

    pub fn record_abort(&self, error: &str) {
        self.aborted_cycles.fetch_add(1, Ordering::Relaxed);
        self.set_last(false, Some(error.to_string()));
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn set_last(&self, success: bool, error: Option<String>) {
        if let Ok(mut last) = self.last_cycle.lock() {
            *last = Some(LastCycle {
                finished_at: Utc::now(),
                success,
                error,
            });
        }
    }

    pub fn last_cycle(&self) -> Option<LastCycle> {
        self.last_cycle.lock().ok().and_then(|last| last.clone())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;
        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows: [(&str, &Stat, usize); 4] = [
            ("live processes", &self.live_processes, 0),
            ("sampled processes", &self.sampled_processes, 0),
            ("failed samples", &self.failed_samples, 0),
            ("cycle duration (s)", &self.cycle_duration_seconds, 3),
        ];
        for (name, stat, precision) in rows {
            let (cur, avg, max, min) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "completed cycles: {}",
            self.total_cycles.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            out,
            "aborted cycles: {}",
            self.aborted_cycles.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            out,
            "http requests: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime (s): {}", self.uptime_seconds()).ok();
        if let Some(last) = self.last_cycle() {
            writeln!(
                out,
                "last cycle: {} ({})",
                last.finished_at.to_rfc3339(),
                if last.success { "ok" } else { "aborted" }
            )
            .ok();
            if let Some(error) = last.error {
                writeln!(out, "last error: {error}").ok();
            }
        }

        out
    }
}

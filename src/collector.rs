//! Collection cycle orchestration.
//!
//! One cycle lists the live JVMs, evicts state and series of processes that
//! are gone, then samples every live process with at most
//! `max_concurrent_scrapes` samples in flight. A cycle only finishes after
//! every sampling task has completed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ActiveConfig, ConfigStore};
use crate::delta::{self, ApplyOutcome};
use crate::error::{CycleError, SampleError};
use crate::inventory::ProcessInventory;
use crate::metrics::GcMetrics;
use crate::sampler::Sampler;
use crate::store::StateStore;

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Size of the normalized live set.
    pub live: usize,
    /// Processes sampled and published.
    pub sampled: usize,
    /// Processes whose sample failed.
    pub failed: usize,
    /// Processes that exited before they could be sampled.
    pub skipped: usize,
    /// Processes whose state was evicted at the start of the cycle.
    pub evicted: usize,
    /// Counter regressions clamped during the cycle.
    pub regressions: usize,
    pub duration: Duration,
}

/// Outcome of sampling one process.
#[derive(Debug)]
enum TaskOutcome {
    Published(ApplyOutcome),
    Gone,
    Failed,
}

/// Drives collection cycles over a process inventory and a sampler.
pub struct GcCollector {
    inventory: Arc<dyn ProcessInventory>,
    sampler: Arc<dyn Sampler>,
    config: Arc<ConfigStore>,
    store: Arc<StateStore>,
    metrics: Arc<GcMetrics>,
    cycle_lock: Mutex<()>,
    self_pid: u32,
}

impl GcCollector {
    pub fn new(
        inventory: Arc<dyn ProcessInventory>,
        sampler: Arc<dyn Sampler>,
        config: Arc<ConfigStore>,
        metrics: Arc<GcMetrics>,
    ) -> Self {
        Self {
            inventory,
            sampler,
            config,
            store: Arc::new(StateStore::new()),
            metrics,
            cycle_lock: Mutex::new(()),
            self_pid: std::process::id(),
        }
    }

    /// Overrides the pid treated as "this process" and never sampled.
    pub fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn metrics(&self) -> &GcMetrics {
        &self.metrics
    }

    /// Runs one full collection cycle.
    ///
    /// Returns [`CycleError::AlreadyRunning`] without doing anything when a
    /// cycle is still in flight, and [`CycleError::Inventory`] without
    /// touching any state when the live set cannot be obtained.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _cycle = self
            .cycle_lock
            .try_lock()
            .map_err(|_| CycleError::AlreadyRunning)?;

        let start = Instant::now();
        // One configuration snapshot for the whole cycle.
        let active = self.config.current();
        let cfg = &active.config;

        let candidates = self
            .inventory
            .list_candidate_pids(&cfg.pid_filter)
            .await?;
        debug!("Inventory returned {} candidate processes", candidates.len());

        let live = self.normalize(candidates, cfg.max_monitored_processes);
        let mut report = CycleReport {
            live: live.len(),
            evicted: self.evict(&live),
            ..Default::default()
        };

        let permits = cfg.max_concurrent_scrapes.min(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();
        for pid in live.iter().copied() {
            let task = SampleTask {
                inventory: self.inventory.clone(),
                sampler: self.sampler.clone(),
                store: self.store.clone(),
                metrics: self.metrics.clone(),
                active: active.clone(),
            };
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // The permit is released when the task returns.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome::Failed;
                };
                task.run(pid).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Published(outcome)) => {
                    report.sampled += 1;
                    if let ApplyOutcome::Updated { regressed } = outcome {
                        report.regressions += regressed;
                    }
                }
                Ok(TaskOutcome::Gone) => report.skipped += 1,
                Ok(TaskOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("Sampling task did not complete: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.duration = start.elapsed();
        info!(
            "Collection cycle completed: {} live, {} sampled, {} failed, {} skipped, {} evicted, {:.2}ms",
            report.live,
            report.sampled,
            report.failed,
            report.skipped,
            report.evicted,
            report.duration.as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Drops dead pids and our own pid, sorts, dedups and applies the cap.
    fn normalize(&self, mut pids: Vec<u32>, cap: usize) -> Vec<u32> {
        pids.retain(|&pid| pid != self.self_pid && self.inventory.is_alive(pid));
        pids.sort_unstable();
        pids.dedup();

        if pids.len() > cap {
            warn!(
                "{} JVM processes found, monitoring only the first {} (max_monitored_processes)",
                pids.len(),
                cap
            );
            pids.truncate(cap);
        }
        pids
    }

    /// Removes state and series of every tracked pid missing from `live`.
    fn evict(&self, live: &[u32]) -> usize {
        let mut evicted = 0;
        for pid in self.store.pids() {
            if live.binary_search(&pid).is_ok() {
                continue;
            }
            self.store.remove(pid);
            let series = self.metrics.remove_process(pid);
            debug!("Evicted pid {} ({} series removed)", pid, series);
            evicted += 1;
        }
        evicted
    }
}

/// Everything one sampling task needs, owned so it can run on any worker.
struct SampleTask {
    inventory: Arc<dyn ProcessInventory>,
    sampler: Arc<dyn Sampler>,
    store: Arc<StateStore>,
    metrics: Arc<GcMetrics>,
    active: Arc<ActiveConfig>,
}

impl SampleTask {
    async fn run(self, pid: u32) -> TaskOutcome {
        // The process may have exited while we waited for a slot.
        if !self.inventory.is_alive(pid) {
            debug!("Skipping pid {}: {}", pid, SampleError::NotAlive(pid));
            return TaskOutcome::Gone;
        }

        let cmdline = self.inventory.command_line(pid);
        let label = self.active.labels.resolve(pid, cmdline.as_deref());

        let settings = &self.active.sampler;
        let sampled = match tokio::time::timeout(
            settings.timeout,
            self.sampler.sample(pid, settings),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SampleError::Timeout(settings.timeout)),
        };

        match sampled {
            Ok(snapshot) => TaskOutcome::Published(delta::apply(
                &self.store,
                &self.metrics,
                pid,
                &label,
                snapshot,
            )),
            Err(e) => {
                warn!("Sampling pid {} ({}) failed: {}", pid, label, e);
                TaskOutcome::Failed
            }
        }
    }
}

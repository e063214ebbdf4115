//! Collection cycle tests against in-memory process inventories and samplers.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use herakles_jvm_gc_exporter::sampler::parse_jstat_output;
use herakles_jvm_gc_exporter::{
    Config, ConfigStore, CycleError, GcCollector, GcMetrics, GcSnapshot, InventoryError,
    Overrides, ProcessInventory, SampleError, Sampler, SamplerSettings,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HEADER: &str = "S0C S1C EC EU OC OU MC MU CCSC CCSU YGC YGCT FGC FGCT GCT";
const OWN_PID: u32 = 4242;

fn jstat_output(ygc: u32) -> String {
    format!("{HEADER}\n100 100 500 50 1000 200 50 10 20 5 {ygc} 0.05 1 0.2 0.25\n")
}

// -------------------------------------------------------------------
// Fakes
// -------------------------------------------------------------------

#[derive(Default)]
struct FakeInventory {
    live: Mutex<BTreeSet<u32>>,
    /// Pids listed by discovery that are already gone when checked.
    dead: Mutex<BTreeSet<u32>>,
    fail: Mutex<bool>,
}

impl FakeInventory {
    fn with_pids(pids: &[u32]) -> Arc<Self> {
        let inventory = Self::default();
        inventory.set_live(pids);
        Arc::new(inventory)
    }

    fn set_live(&self, pids: &[u32]) {
        *self.live.lock().unwrap() = pids.iter().copied().collect();
    }

    fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl ProcessInventory for FakeInventory {
    async fn list_candidate_pids(&self, _filter: &str) -> Result<Vec<u32>, InventoryError> {
        if *self.fail.lock().unwrap() {
            return Err(InventoryError::Spawn {
                program: "pgrep".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "pgrep missing"),
            });
        }
        let mut pids: Vec<u32> = self.live.lock().unwrap().iter().copied().collect();
        pids.extend(self.dead.lock().unwrap().iter().copied());
        Ok(pids)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid == OWN_PID || self.live.lock().unwrap().contains(&pid)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        Some(format!("java -Xmx1g -Dapp.name=svc{pid} -jar app.jar"))
    }
}

/// Serves canned `jstat -gc` output per pid.
#[derive(Default)]
struct ScriptedSampler {
    outputs: Mutex<HashMap<u32, String>>,
    failing: Mutex<BTreeSet<u32>>,
    hanging: Mutex<BTreeSet<u32>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedSampler {
    fn set_output(&self, pid: u32, text: String) {
        self.outputs.lock().unwrap().insert(pid, text);
    }
}

#[async_trait]
impl Sampler for ScriptedSampler {
    async fn sample(
        &self,
        pid: u32,
        settings: &SamplerSettings,
    ) -> Result<GcSnapshot, SampleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hanging.lock().unwrap().contains(&pid) {
            tokio::time::sleep(settings.timeout * 100).await;
        }

        let result = if self.failing.lock().unwrap().contains(&pid) {
            Err(SampleError::Spawn {
                program: settings.program.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, format!("{pid} not attachable")),
            })
        } else {
            let text = self
                .outputs
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .unwrap_or_else(|| jstat_output(0));
            parse_jstat_output(&text).map_err(SampleError::from)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// -------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------

struct Harness {
    registry: Registry,
    inventory: Arc<FakeInventory>,
    sampler: Arc<ScriptedSampler>,
    config: Arc<ConfigStore>,
    collector: Arc<GcCollector>,
}

fn harness_with(pids: &[u32], sampler: ScriptedSampler, config: Config) -> Harness {
    let registry = Registry::new();
    let metrics = Arc::new(GcMetrics::new(&registry).unwrap());
    let store = Arc::new(ConfigStore::new(config, None, Overrides::default()).unwrap());
    let inventory = FakeInventory::with_pids(pids);
    let sampler = Arc::new(sampler);
    let collector = Arc::new(
        GcCollector::new(inventory.clone(), sampler.clone(), store.clone(), metrics)
            .with_self_pid(OWN_PID),
    );
    Harness {
        registry,
        inventory,
        sampler,
        config: store,
        collector,
    }
}

fn harness(pids: &[u32]) -> Harness {
    harness_with(pids, ScriptedSampler::default(), Config::default())
}

fn exposition(registry: &Registry) -> String {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .unwrap();
    String::from_utf8(buf).unwrap()
}

/// Value of the series `name` for `pid`, if exported.
fn series_value(registry: &Registry, name: &str, pid: u32) -> Option<f64> {
    let needle = format!("pid=\"{pid}\"");
    exposition(registry)
        .lines()
        .filter(|l| l.starts_with(&format!("{name}{{")))
        .find(|l| l.contains(&needle))
        .and_then(|l| l.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

fn series_for_pid(registry: &Registry, pid: u32) -> usize {
    let needle = format!("pid=\"{pid}\"");
    exposition(registry)
        .lines()
        .filter(|l| !l.starts_with('#') && l.contains(&needle))
        .count()
}

// -------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------

#[tokio::test]
async fn test_two_cycles_publish_gauges_then_counter_increments() {
    let h = harness(&[101, 202]);
    h.sampler.set_output(101, jstat_output(3));

    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.live, 2);
    assert_eq!(report.sampled, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(
        series_value(&h.registry, "jvm_gc_eden_capacity_bytes", 101),
        Some(500.0 * 1024.0)
    );
    assert!(exposition(&h.registry).contains("app=\"svc101\""));
    // First sight only records the baseline.
    assert_eq!(series_value(&h.registry, "jvm_gc_young_gc_count", 101), None);
    assert_eq!(h.collector.store().len(), 2);

    h.sampler.set_output(101, jstat_output(5));
    h.collector.run_cycle().await.unwrap();

    assert_eq!(series_value(&h.registry, "jvm_gc_young_gc_count", 101), Some(2.0));
    assert_eq!(series_value(&h.registry, "jvm_gc_young_gc_count", 202), Some(0.0));
    let stored = h.collector.store().get(101).unwrap();
    assert_eq!(stored.counters.young_gc_count, 5.0);
}

#[tokio::test]
async fn test_exited_process_is_evicted() {
    let h = harness(&[101, 202]);
    h.collector.run_cycle().await.unwrap();
    h.collector.run_cycle().await.unwrap();
    assert!(series_for_pid(&h.registry, 202) > 0);

    h.inventory.set_live(&[101]);
    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.evicted, 1);
    assert_eq!(h.collector.store().pids(), vec![101]);
    assert_eq!(series_for_pid(&h.registry, 202), 0);
    assert!(series_for_pid(&h.registry, 101) > 0);
    assert_eq!(h.collector.metrics().tracked_processes(), 1);
}

#[tokio::test]
async fn test_inventory_failure_leaves_state_untouched() {
    let h = harness(&[101, 202]);
    h.collector.run_cycle().await.unwrap();
    let before = exposition(&h.registry);
    let calls = h.sampler.calls.load(Ordering::SeqCst);

    h.inventory.set_failing(true);
    let err = h.collector.run_cycle().await.unwrap_err();

    assert!(matches!(err, CycleError::Inventory(_)));
    assert_eq!(h.collector.store().pids(), vec![101, 202]);
    assert_eq!(exposition(&h.registry), before);
    assert_eq!(h.sampler.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_samples_stay_within_limit() {
    let pids: Vec<u32> = (1000..1040).collect();
    let sampler = ScriptedSampler {
        delay: Duration::from_millis(20),
        ..Default::default()
    };
    let config = Config {
        max_concurrent_scrapes: 3,
        ..Config::default()
    };
    let h = harness_with(&pids, sampler, config);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.sampled, pids.len());
    let peak = h.sampler.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded limit");
    assert!(peak >= 2, "samples did not overlap (peak {peak})");
}

#[tokio::test]
async fn test_failing_process_does_not_affect_others() {
    let h = harness(&[101, 202, 303]);
    h.sampler.failing.lock().unwrap().insert(202);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.sampled, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(h.collector.store().pids(), vec![101, 303]);
    assert_eq!(series_for_pid(&h.registry, 202), 0);
    assert!(series_value(&h.registry, "jvm_gc_old_gen_usage_bytes", 303).is_some());
}

#[tokio::test]
async fn test_hanging_sampler_times_out() {
    let config = Config {
        jstat_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let h = harness_with(&[101, 202], ScriptedSampler::default(), config);
    h.sampler.hanging.lock().unwrap().insert(202);

    let report = tokio::time::timeout(Duration::from_secs(5), h.collector.run_cycle())
        .await
        .expect("cycle must not hang")
        .unwrap();

    assert_eq!(report.sampled, 1);
    assert_eq!(report.failed, 1);
    assert!(h.collector.store().get(202).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_cycle_is_rejected() {
    let sampler = ScriptedSampler {
        delay: Duration::from_millis(200),
        ..Default::default()
    };
    let h = harness_with(&[101], sampler, Config::default());

    let first = {
        let collector = h.collector.clone();
        tokio::spawn(async move { collector.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = h.collector.run_cycle().await;
    assert!(matches!(second, Err(CycleError::AlreadyRunning)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.sampled, 1);
}

#[tokio::test]
async fn test_own_pid_and_dead_pids_are_not_sampled() {
    let h = harness(&[101, OWN_PID]);
    h.inventory.dead.lock().unwrap().insert(555);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.live, 1);
    assert_eq!(h.sampler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.collector.store().pids(), vec![101]);
}

#[tokio::test]
async fn test_monitored_set_is_capped_to_lowest_pids() {
    let config = Config {
        max_monitored_processes: 2,
        ..Config::default()
    };
    let h = harness_with(&[303, 101, 202], ScriptedSampler::default(), config);

    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.live, 2);
    assert_eq!(h.collector.store().pids(), vec![101, 202]);
}

#[tokio::test]
async fn test_counter_regression_is_clamped() {
    let h = harness(&[101]);
    h.sampler.set_output(101, jstat_output(7));
    h.collector.run_cycle().await.unwrap();

    // Restarted JVM reusing the pid reports lower counters.
    h.sampler.set_output(101, jstat_output(2));
    let report = h.collector.run_cycle().await.unwrap();
    assert_eq!(report.regressions, 1);
    assert_eq!(series_value(&h.registry, "jvm_gc_young_gc_count", 101), Some(0.0));

    // The lower value became the new baseline.
    h.sampler.set_output(101, jstat_output(4));
    h.collector.run_cycle().await.unwrap();
    assert_eq!(series_value(&h.registry, "jvm_gc_young_gc_count", 101), Some(2.0));
}

#[tokio::test]
async fn test_replaced_config_applies_to_next_cycle() {
    let h = harness(&[101, 202, 303]);
    h.collector.run_cycle().await.unwrap();
    assert_eq!(h.collector.store().len(), 3);

    h.config
        .replace(Config {
            max_monitored_processes: 1,
            ..Config::default()
        })
        .unwrap();
    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.live, 1);
    assert_eq!(report.evicted, 2);
    assert_eq!(h.collector.store().pids(), vec![101]);
    assert_eq!(series_for_pid(&h.registry, 303), 0);
}

#[tokio::test]
async fn test_invalid_replacement_keeps_previous_config() {
    let h = harness(&[101]);
    let err = h.config.replace(Config {
        max_concurrent_scrapes: 0,
        ..Config::default()
    });

    assert!(err.is_err());
    assert_eq!(h.config.current().config.max_concurrent_scrapes, 50);
    assert_eq!(h.collector.run_cycle().await.unwrap().sampled, 1);
}

#[tokio::test]
async fn test_label_change_leaves_single_series() {
    let h = harness(&[101]);
    h.collector.run_cycle().await.unwrap();
    assert!(exposition(&h.registry).contains("app=\"svc101\""));

    h.config
        .replace(Config {
            app_name_labels: vec!["-Dservice".to_string()],
            ..Config::default()
        })
        .unwrap();
    h.collector.run_cycle().await.unwrap();

    let text = exposition(&h.registry);
    let eden: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("jvm_gc_eden_capacity_bytes{") && l.contains("pid=\"101\""))
        .collect();
    assert_eq!(eden.len(), 1, "{eden:?}");
    assert!(eden[0].contains("app=\"pid-101\""));
    assert!(!text.contains("app=\"svc101\""));
}

#[tokio::test]
async fn test_empty_discovery_evicts_everything() {
    let h = harness(&[101, 202]);
    h.collector.run_cycle().await.unwrap();

    h.inventory.set_live(&[]);
    let report = h.collector.run_cycle().await.unwrap();

    assert_eq!(report.live, 0);
    assert_eq!(report.evicted, 2);
    assert!(h.collector.store().is_empty());
    assert_eq!(h.collector.metrics().tracked_processes(), 0);
}

//! herakles-jvm-gc-exporter library.
//!
//! Samples `jstat -gc` for every JVM on the host in bounded-concurrency
//! cycles and publishes per-process heap gauges and GC counters to a
//! Prometheus registry.

pub mod collector;
pub mod config;
pub mod delta;
pub mod error;
pub mod health_stats;
pub mod inventory;
pub mod label;
pub mod metrics;
pub mod sampler;
pub mod snapshot;
pub mod store;

pub use collector::{CycleReport, GcCollector};
pub use config::{ActiveConfig, Config, ConfigStore, Overrides};
pub use error::{ConfigError, CycleError, InventoryError, ParseError, SampleError};
pub use health_stats::HealthStats;
pub use inventory::{PgrepInventory, ProcessInventory};
pub use metrics::{ExporterMetrics, GcMetrics};
pub use sampler::{JstatSampler, Sampler, SamplerSettings};
pub use snapshot::{GcCounters, GcSnapshot, HeapSpaces};
pub use store::StateStore;

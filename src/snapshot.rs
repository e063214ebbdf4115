//! Raw garbage collector snapshots as reported by `jstat -gc`.
//!
//! Capacities and usages are stored in bytes; the collection counters are
//! cumulative since JVM start and only become meaningful as deltas between
//! two snapshots of the same process.

use ahash::AHashMap as HashMap;
use serde::Serialize;

/// `jstat` reports space sizes in kilobytes.
const KB: f64 = 1024.0;

/// Capacity and usage of every heap and non-heap space, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeapSpaces {
    pub s0_capacity: f64,
    pub s1_capacity: f64,
    pub s0_usage: f64,
    pub s1_usage: f64,
    pub eden_capacity: f64,
    pub eden_usage: f64,
    pub old_capacity: f64,
    pub old_usage: f64,
    pub metaspace_capacity: f64,
    pub metaspace_usage: f64,
    pub class_capacity: f64,
    pub class_usage: f64,
}

/// Cumulative collection counts and times (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GcCounters {
    pub young_gc_count: f64,
    pub young_gc_time: f64,
    pub full_gc_count: f64,
    pub full_gc_time: f64,
    pub total_gc_time: f64,
}

impl GcCounters {
    /// Counter values paired with their names, in export order.
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("young_gc_count", self.young_gc_count),
            ("young_gc_time", self.young_gc_time),
            ("full_gc_count", self.full_gc_count),
            ("full_gc_time", self.full_gc_time),
            ("total_gc_time", self.total_gc_time),
        ]
    }
}

/// One sample of one process at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GcSnapshot {
    pub spaces: HeapSpaces,
    pub counters: GcCounters,
}

impl GcSnapshot {
    /// Builds a snapshot from `jstat -gc` columns keyed by header name.
    ///
    /// Missing columns read as zero; older JVMs do not report every space.
    pub fn from_jstat_fields(fields: &HashMap<&str, f64>) -> Self {
        let field = |name: &str| fields.get(name).copied().unwrap_or(0.0);
        let kb = |name: &str| field(name) * KB;

        Self {
            spaces: HeapSpaces {
                s0_capacity: kb("S0C"),
                s1_capacity: kb("S1C"),
                s0_usage: kb("S0U"),
                s1_usage: kb("S1U"),
                eden_capacity: kb("EC"),
                eden_usage: kb("EU"),
                old_capacity: kb("OC"),
                old_usage: kb("OU"),
                metaspace_capacity: kb("MC"),
                metaspace_usage: kb("MU"),
                class_capacity: kb("CCSC"),
                class_usage: kb("CCSU"),
            },
            counters: GcCounters {
                young_gc_count: field("YGC"),
                young_gc_time: field("YGCT"),
                full_gc_count: field("FGC"),
                full_gc_time: field("FGCT"),
                total_gc_time: field("GCT"),
            },
        }
    }
}

//! Documentation endpoint handler.
//!
//! This module provides the `/doc` endpoint handler that displays
//! comprehensive documentation for the exporter.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /doc endpoint.
#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");

    // Track HTTP request
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let doc = format!(
        r#"HERAKLES JVM GC EXPORTER - DOCUMENTATION
========================================

VERSION: {}
DESCRIPTION: Prometheus exporter for per-process JVM garbage collector metrics

HTTP ENDPOINTS
--------------
GET /metrics     - Prometheus metrics endpoint
GET /health      - Health check with internal statistics (plain text)
GET /config      - Current configuration (plain text)
GET /doc         - This documentation (plain text)

AVAILABLE METRICS
-----------------
All per-process series carry the labels pid and app.

jvm_gc_s0_capacity_bytes / jvm_gc_s0_usage_bytes           - Survivor space 0
jvm_gc_s1_capacity_bytes / jvm_gc_s1_usage_bytes           - Survivor space 1
jvm_gc_eden_capacity_bytes / jvm_gc_eden_usage_bytes       - Eden space
jvm_gc_old_gen_capacity_bytes / jvm_gc_old_gen_usage_bytes - Old generation
jvm_gc_metaspace_capacity_bytes / jvm_gc_metaspace_usage_bytes
jvm_gc_compressed_class_capacity_bytes / jvm_gc_compressed_class_usage_bytes

jvm_gc_young_gc_count            - Young collections (counter)
jvm_gc_young_gc_time_seconds     - Time in young collections (counter)
jvm_gc_full_gc_count             - Full collections (counter)
jvm_gc_full_gc_time_seconds      - Time in full collections (counter)
jvm_gc_total_gc_time_seconds     - Total GC time (counter)

Counters advance by the difference between consecutive samples, so a
process shows up in the counters from its second cycle on.

jvm_gc_exporter_cycle_duration_seconds   - Duration of the last cycle
jvm_gc_exporter_monitored_processes      - JVMs in the last live set
jvm_gc_exporter_last_cycle_success       - 1 if the last cycle completed
jvm_gc_exporter_sample_failures_total    - Failed jstat samples
jvm_gc_exporter_evicted_processes_total  - Exited JVMs whose series were removed
jvm_gc_exporter_cycles_skipped_total     - Cycles skipped while one was running

APP LABEL
---------
The app label is the value of the first configured -D marker found on the
JVM command line (default: -Dapp.name, -Dapp, -Dspring.application.name).
Without a marker the label is pid-<pid>.

CONFIGURATION
-------------
Config file locations (in order):
1. CLI specified: -c /path/to/config.yaml (created with defaults if missing)
2. System config: /etc/herakles/jvm-gc-exporter.yaml
3. Current directory: ./herakles-jvm-gc-exporter.{{yaml,yml,json}}

Key configuration options:
- port: HTTP listen port (default: 9101)
- bind: Bind address (default: 0.0.0.0)
- scrape_interval: Time between cycles (default: 30s)
- jstat_timeout: Per-process jstat timeout (default: 5s)
- max_monitored_processes: Upper bound on monitored JVMs (default: 1000)
- max_concurrent_scrapes: Parallel jstat invocations (default: 50)
- jstat_path: jstat binary (default: jstat)
- app_name_labels: Ordered -D markers for the app label

Send SIGHUP to reload the configuration file. Collection settings and the
log level apply from the next cycle; bind, port and TLS need a restart.

TLS/SSL Configuration:
- tls_cert_file: Path to TLS certificate (PEM format)
- tls_key_file: Path to TLS private key (PEM format)

CLI COMMANDS
------------
herakles-jvm-gc-exporter                       - Start the exporter
herakles-jvm-gc-exporter check --all           - Validate system requirements
herakles-jvm-gc-exporter config -o config.yaml - Generate config file
herakles-jvm-gc-exporter test                  - Sample all JVMs once
herakles-jvm-gc-exporter --help                - Show all CLI options

EXAMPLE USAGE
-------------
# Start exporter
herakles-jvm-gc-exporter -c /etc/herakles/jvm-gc-exporter.yaml

# Reload configuration
kill -HUP $(pidof herakles-jvm-gc-exporter)

# Get metrics
curl http://localhost:9101/metrics

# Check health
curl http://localhost:9101/health

EXAMPLE PROMQL QUERIES
----------------------
# Old generation fill ratio per application
jvm_gc_old_gen_usage_bytes / jvm_gc_old_gen_capacity_bytes

# Share of wall time spent in GC over 5 minutes
rate(jvm_gc_total_gc_time_seconds[5m])

# Full collections per hour by application
sum by (app) (increase(jvm_gc_full_gc_count[1h]))

PROMETHEUS SCRAPE CONFIG
------------------------
scrape_configs:
  - job_name: 'herakles-jvm-gc'
    static_configs:
      - targets: ['localhost:9101']
    scrape_interval: 30s

MORE INFORMATION
----------------
GitHub: https://github.com/herakles-io/herakles-jvm-gc-exporter

{}
"#,
        version, FOOTER_TEXT
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}

//! herakles-jvm-gc-exporter - version 0.1.0
//!
//! Prometheus exporter for per-process JVM garbage collector metrics.
//! Discovers running JVMs, samples them with `jstat -gc` in bounded
//! parallel cycles and serves heap gauges and GC counters over HTTP.

mod cli;
mod commands;
mod handlers;
mod state;

use axum::{routing::get, Router};
use clap::Parser;
use herakles_jvm_gc_exporter::config::resolve_config_source;
use herakles_jvm_gc_exporter::{
    ActiveConfig, Config, ConfigStore, ExporterMetrics, GcCollector, GcMetrics, HealthStats,
    JstatSampler, Overrides, PgrepInventory,
};
use prometheus::Registry;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Registry as LogRegistry};

use cli::{Args, Commands};
use handlers::{config_handler, doc_handler, health_handler, metrics_handler};
use state::{AppState, SharedState};

/// Handle used to change the log level after a reload.
type LogHandle = reload::Handle<LevelFilter, LogRegistry>;

/// Grace period for open connections on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// -------------------------------------------------------------------
/// LOGGING
/// -------------------------------------------------------------------
fn setup_logging(level: LevelFilter) -> LogHandle {
    let (filter, handle) = reload::Layer::new(level);

    let init = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init();
    if let Err(e) = init {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    info!("Logging initialized with level: {}", level);
    handle
}

/// -------------------------------------------------------------------
/// CONFIGURATION
/// -------------------------------------------------------------------

/// Builds the config store from CLI arguments (CLI > file > defaults).
fn resolve_config(args: &Args) -> anyhow::Result<ConfigStore> {
    let overrides = Overrides {
        port: args.port,
        bind: args.bind.map(|ip| ip.to_string()),
        log_level: args.log_level.map(|l| l.as_str().to_string()),
    };

    if args.no_config {
        return Ok(ConfigStore::new(Config::default(), None, overrides)?);
    }

    let source = resolve_config_source(args.config.as_deref())?;
    Ok(ConfigStore::load(source, overrides)?)
}

/// -------------------------------------------------------------------
/// BACKGROUND TASKS
/// -------------------------------------------------------------------

fn cycle_ticker(period: Duration) -> Interval {
    let now = Instant::now();
    let mut ticker = interval_at(now.checked_add(period).unwrap_or(now), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Runs collection cycles every `scrape_interval`, picking up interval
/// changes made by a reload.
fn spawn_collection_loop(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut period = state.config.current().config.scrape_interval;
        let mut ticker = cycle_ticker(period);
        debug!(
            "Background collection task started with {:?} interval",
            period
        );

        loop {
            ticker.tick().await;
            debug!("Starting scheduled collection cycle");
            state.collect().await;

            let next = state.config.current().config.scrape_interval;
            if next != period {
                info!("Scrape interval changed from {:?} to {:?}", period, next);
                period = next;
                ticker = cycle_ticker(period);
            }
        }
    })
}

/// Settings that only take effect when the listener is recreated.
fn restart_required(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.bind != new.bind {
        changed.push("bind");
    }
    if old.port != new.port {
        changed.push("port");
    }
    if old.enable_health != new.enable_health {
        changed.push("enable_health");
    }
    if old.tls_cert_file != new.tls_cert_file || old.tls_key_file != new.tls_key_file {
        changed.push("tls");
    }
    changed
}

fn apply_reload(state: &AppState, log_handle: &LogHandle) {
    let previous = state.config.current();
    let active = match state.config.reload() {
        Ok(active) => active,
        Err(e) => {
            error!("Configuration reload failed, keeping previous configuration: {}", e);
            return;
        }
    };

    let level = active.config.level_filter();
    if level != previous.config.level_filter() {
        match log_handle.modify(|filter| *filter = level) {
            Ok(()) => info!("Log level changed to {}", level),
            Err(e) => warn!("Failed to change log level: {}", e),
        }
    }

    let pending = restart_required(&previous.config, &active.config);
    if !pending.is_empty() {
        warn!(
            "Changed settings need a restart to take effect: {}",
            pending.join(", ")
        );
    }

    info!("Configuration reloaded");
}

/// Reloads the configuration file on SIGHUP.
#[cfg(unix)]
fn spawn_reload_watcher(state: SharedState, log_handle: LogHandle) -> anyhow::Result<JoinHandle<()>> {
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading configuration");
            apply_reload(&state, &log_handle);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_watcher(_state: SharedState, _log_handle: LogHandle) -> anyhow::Result<JoinHandle<()>> {
    Ok(tokio::spawn(std::future::pending()))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// -------------------------------------------------------------------
/// HTTP SERVER
/// -------------------------------------------------------------------

fn build_router(state: SharedState, config: &Config) -> Router {
    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/config", get(config_handler))
        .route("/doc", get(doc_handler));

    // Conditionally add health endpoint
    if config.enable_health {
        app = app.route("/health", get(health_handler));
    }

    app.with_state(state)
}

async fn serve(app: Router, config: &Config) -> anyhow::Result<()> {
    let ip: IpAddr = config.bind.parse()?;
    let addr = SocketAddr::new(ip, config.port);

    if let (Some(cert), Some(key)) = (&config.tls_cert_file, &config.tls_key_file) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
        let handle = axum_server::Handle::new();

        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("herakles-jvm-gc-exporter listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    let listener = TcpListener::bind(addr).await?;
    info!("herakles-jvm-gc-exporter listening on http://{}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }
    Ok(())
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config subcommand generates files and needs no effective config
    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return commands::command_config(output.clone(), *format, *commented);
    }

    let store = match resolve_config(&args) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    };

    if args.check_config {
        println!("✅ Configuration is valid");
        return Ok(());
    }

    let active: Arc<ActiveConfig> = store.current();

    if args.show_config {
        return commands::show_config(&active.config, args.config_format);
    }

    if let Some(command) = &args.command {
        return match command {
            Commands::Check {
                jstat,
                discovery,
                all,
            } => commands::command_check(*jstat, *discovery, *all, &active).await,
            Commands::Test { verbose, format } => {
                commands::command_test(*verbose, *format, &active).await
            }
            Commands::Config { .. } => Ok(()),
        };
    }

    // Setup logging subsystem first to enable proper logging
    let log_handle = setup_logging(active.config.level_filter());

    info!(
        "Starting herakles-jvm-gc-exporter {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );
    match store.source() {
        Some(path) => info!("Using configuration file: {}", path.display()),
        None => info!("No configuration file, using built-in defaults"),
    }

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let gc_metrics = Arc::new(GcMetrics::new(&registry)?);
    let exporter_metrics = ExporterMetrics::new(&registry)?;
    debug!("All metrics registered successfully");

    let config = Arc::new(store);
    let collector = Arc::new(GcCollector::new(
        Arc::new(PgrepInventory::new()),
        Arc::new(JstatSampler),
        config.clone(),
        gc_metrics,
    ));

    // Create shared application state
    let state: SharedState = Arc::new(AppState {
        registry,
        collector,
        exporter_metrics,
        config,
        health_stats: Arc::new(HealthStats::new()),
    });

    // Initial cycle so the first scrape already has data
    info!("Performing initial collection cycle");
    state.collect().await;

    let background_task = spawn_collection_loop(state.clone());
    let reload_task = spawn_reload_watcher(state.clone(), log_handle)?;

    let app = build_router(state.clone(), &active.config);
    let result = serve(app, &active.config).await;

    // Cleanup: cancel background tasks before exit
    background_task.abort();
    reload_task.abort();
    let _ = background_task.await;
    let _ = reload_task.await;

    if result.is_ok() {
        info!("herakles-jvm-gc-exporter stopped gracefully");
    }
    result
}

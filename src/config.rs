//! Configuration loading, validation and hot-swappable storage.
//!
//! The effective configuration is an immutable [`ActiveConfig`] held behind a
//! [`ConfigStore`]. Readers clone an `Arc` once and keep using that snapshot;
//! a reload builds and validates a complete new value before swapping it in,
//! so nobody ever observes fields from two different files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;
use crate::label::LabelResolver;
use crate::sampler::SamplerSettings;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9101;
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_JSTAT_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_SCRAPE_INTERVAL: Duration = Duration::from_secs(24 * 3600);
pub const MAX_JSTAT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_MONITORED_PROCESSES: usize = 1000;
pub const DEFAULT_MAX_CONCURRENT_SCRAPES: usize = 50;
pub const DEFAULT_JSTAT_PATH: &str = "jstat";
pub const DEFAULT_APP_NAME_LABELS: &[&str] = &["-Dapp.name", "-Dapp", "-Dspring.application.name"];

/// Locations searched when no config file is given on the command line.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/herakles/jvm-gc-exporter.yaml",
    "/etc/herakles/jvm-gc-exporter.yml",
    "/etc/herakles/jvm-gc-exporter.json",
    "./herakles-jvm-gc-exporter.yaml",
    "./herakles-jvm-gc-exporter.yml",
    "./herakles-jvm-gc-exporter.json",
];

/// Exporter configuration as read from file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server configuration
    pub bind: String,
    #[serde(alias = "listen_port")]
    pub port: u16,
    pub enable_health: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key_file: Option<PathBuf>,

    // Collection
    #[serde(with = "duration_str")]
    pub scrape_interval: Duration,
    #[serde(with = "duration_str")]
    pub jstat_timeout: Duration,
    pub max_monitored_processes: usize,
    pub max_concurrent_scrapes: usize,
    pub jstat_path: String,
    pub pid_filter: String,
    pub app_name_labels: Vec<String>,

    // Logging
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            enable_health: true,
            tls_cert_file: None,
            tls_key_file: None,
            scrape_interval: DEFAULT_SCRAPE_INTERVAL,
            jstat_timeout: DEFAULT_JSTAT_TIMEOUT,
            max_monitored_processes: DEFAULT_MAX_MONITORED_PROCESSES,
            max_concurrent_scrapes: DEFAULT_MAX_CONCURRENT_SCRAPES,
            jstat_path: DEFAULT_JSTAT_PATH.to_string(),
            pid_filter: String::new(),
            app_name_labels: DEFAULT_APP_NAME_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Validates the configuration (used by --check-config, startup and reload).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_scrapes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_scrapes must be at least 1".into(),
            ));
        }
        if self.max_monitored_processes == 0 {
            return Err(ConfigError::Invalid(
                "max_monitored_processes must be at least 1".into(),
            ));
        }
        if self.scrape_interval.is_zero() || self.scrape_interval > MAX_SCRAPE_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "scrape_interval must be between 1ms and {}",
                humantime::format_duration(MAX_SCRAPE_INTERVAL)
            )));
        }
        if self.jstat_timeout.is_zero() || self.jstat_timeout > MAX_JSTAT_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "jstat_timeout must be between 1ms and {}",
                humantime::format_duration(MAX_JSTAT_TIMEOUT)
            )));
        }
        if self.jstat_path.trim().is_empty() {
            return Err(ConfigError::Invalid("jstat_path must not be empty".into()));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "invalid log_level '{}', expected off, error, warn, info, debug or trace",
                self.log_level
            )));
        }
        for label in &self.app_name_labels {
            if !label.starts_with("-D") || label.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "invalid app_name_label {label:?}, expected -D<property> without spaces"
                )));
            }
        }
        if self.tls_cert_file.is_some() != self.tls_key_file.is_some() {
            return Err(ConfigError::Invalid(
                "tls_cert_file and tls_key_file must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Log level as a filter; falls back to INFO for unparsable values.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::INFO)
    }
}

/// Values given on the command line; they win over the file on every load.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

/// A validated configuration together with the state derived from it.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    pub config: Config,
    pub labels: LabelResolver,
    pub sampler: SamplerSettings,
}

impl ActiveConfig {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let labels = LabelResolver::new(&config.app_name_labels)
            .map_err(|e| ConfigError::Invalid(format!("invalid app_name_labels: {e}")))?;
        let sampler = SamplerSettings {
            program: config.jstat_path.clone(),
            timeout: config.jstat_timeout,
        };
        Ok(Self {
            config,
            labels,
            sampler,
        })
    }
}

/// Holder of the current configuration snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    active: RwLock<Arc<ActiveConfig>>,
    source: Option<PathBuf>,
    overrides: Overrides,
}

impl ConfigStore {
    /// Creates a store from an initial configuration, applying `overrides`.
    pub fn new(
        mut config: Config,
        source: Option<PathBuf>,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        overrides.apply(&mut config);
        let active = Arc::new(ActiveConfig::new(config)?);
        Ok(Self {
            active: RwLock::new(active),
            source,
            overrides,
        })
    }

    /// Loads the file at `source` (if any) and creates a store from it.
    pub fn load(source: Option<PathBuf>, overrides: Overrides) -> Result<Self, ConfigError> {
        let config = match &source {
            Some(path) => load_config_file(path)?,
            None => Config::default(),
        };
        Self::new(config, source, overrides)
    }

    /// Path the configuration was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<ActiveConfig> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Validates `config` and swaps it in as a whole.
    /// On error the previous configuration stays active.
    pub fn replace(&self, mut config: Config) -> Result<Arc<ActiveConfig>, ConfigError> {
        self.overrides.apply(&mut config);
        let next = Arc::new(ActiveConfig::new(config)?);
        let mut guard = match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next.clone();
        Ok(next)
    }

    /// Re-reads the source file and swaps the result in.
    pub fn reload(&self) -> Result<Arc<ActiveConfig>, ConfigError> {
        let Some(path) = &self.source else {
            return Err(ConfigError::Invalid(
                "no configuration file to reload".into(),
            ));
        };
        let config = load_config_file(path)?;
        self.replace(config)
    }
}

/// Determines which config file to use.
///
/// An explicitly given path that does not exist yet is created with the
/// commented default configuration. Without an explicit path the default
/// locations are searched.
pub fn resolve_config_source(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            write_default_config(path)?;
            info!("Created default configuration at {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(DEFAULT_CONFIG_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf))
}

/// Loads a configuration file, choosing the format by extension (YAML by default).
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        // An empty YAML document means "all defaults".
        _ if content.trim().is_empty() => Config::default(),
        _ => serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Writes the commented default configuration to `path`.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let content = default_config_yaml(true)?;
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Renders the default configuration as YAML, optionally with comments.
pub fn default_config_yaml(commented: bool) -> Result<String, ConfigError> {
    let yaml = serde_yaml::to_string(&Config::default()).map_err(|source| ConfigError::Yaml {
        path: PathBuf::from("<default>"),
        source,
    })?;
    if commented {
        Ok(format!("{CONFIG_COMMENTS}\n{yaml}"))
    } else {
        Ok(yaml)
    }
}

const CONFIG_COMMENTS: &str = r#"# Herakles JVM GC Exporter Configuration
# =======================================
#
# Server Configuration (changes need a restart)
# --------------------
# bind: "0.0.0.0"                # Bind IP (0.0.0.0 = all interfaces)
# port: 9101                     # HTTP port (alias: listen_port)
# enable_health: true            # Enable /health endpoint
# tls_cert_file: null            # PEM certificate, serve HTTPS when set with tls_key_file
# tls_key_file: null             # PEM private key
#
# Collection (reloaded on SIGHUP)
# ----------
# scrape_interval: 30s           # Time between collection cycles (max 24h)
# jstat_timeout: 5s              # Per-process jstat timeout (max 10m)
# max_monitored_processes: 1000  # Upper bound on monitored JVMs
# max_concurrent_scrapes: 50     # jstat invocations running at once
# jstat_path: jstat              # jstat binary (absolute path or $PATH lookup)
# pid_filter: ""                 # Extra pattern, JVMs match "java.*<pid_filter>"
# app_name_labels:               # Ordered -D markers used for the app label
#   - "-Dapp.name"
#
# Logging
# -------
# log_level: "info"              # off, error, warn, info, debug, trace
"#;

/// Serde adapter for durations in humantime form (`500ms`, `5s`, `1m 30s`,
/// `1h`) or a bare number of seconds.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(d, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(#[serde(with = "humantime_serde")] Duration),
        }

        Ok(match Raw::deserialize(d)? {
            Raw::Seconds(n) => Duration::from_secs(n),
            Raw::Text(d) => d,
        })
    }
}

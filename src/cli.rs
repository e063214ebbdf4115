//! CLI arguments and subcommands for herakles-jvm-gc-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Name as accepted by the `log_level` config key.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-jvm-gc-exporter",
    about = "Prometheus exporter for per-process JVM garbage collector metrics",
    long_about = "Prometheus exporter for per-process JVM garbage collector metrics.\n\n\
                  Discovers running JVMs, samples them with `jstat -gc` in bounded parallel \
                  cycles and exports heap space capacities, usages and GC counters per process, \
                  labelled with the application name.",
    author = "Michael Moll <jvm-gc@herakles.io> - Herakles IO",
    version,
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io/herakles-jvm-gc-exporter — More info: https://www.herakles.io — Support: jvm-gc@herakles.io"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML); created with defaults if missing
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check that the jstat binary can be found
        #[arg(long)]
        jstat: bool,

        /// Check that JVM discovery via pgrep works
        #[arg(long)]
        discovery: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Sample every discovered JVM once and print the results
    Test {
        /// Show every heap space instead of a summary line
        #[arg(long)]
        verbose: bool,

        /// Output format for the verbose listing
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_flags() {
        let args = Args::try_parse_from([
            "herakles-jvm-gc-exporter",
            "-p",
            "9300",
            "--log-level",
            "debug",
            "-c",
            "/etc/herakles/jvm-gc-exporter.yaml",
        ])
        .unwrap();
        assert_eq!(args.port, Some(9300));
        assert_eq!(args.log_level.map(LogLevel::as_str), Some("debug"));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_subcommand() {
        let args = Args::try_parse_from(["herakles-jvm-gc-exporter", "check", "--all"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Check { all: true, .. })));
    }
}

//! Error types for the collection pipeline.
//!
//! Each error maps to one failure scope: inventory failures abort a whole
//! cycle, sample failures only affect the process they belong to, and config
//! failures block a reload while the previous configuration stays active.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Failure while listing candidate JVM processes.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Malformed `jstat` output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected a header and a value line, got {0} line(s)")]
    TooFewLines(usize),

    #[error("header has {headers} fields but value line has {values}")]
    ArityMismatch { headers: usize, values: usize },
}

/// Failure while sampling a single process.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("process {0} is no longer alive")]
    NotAlive(u32),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("sampling timed out after {0:?}")]
    Timeout(Duration),

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("invalid jstat output: {0}")]
    Parse(#[from] ParseError),
}

/// Failure while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons a collection cycle did not run to completion.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("process inventory failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("a collection cycle is already in progress")]
    AlreadyRunning,
}

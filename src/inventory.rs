//! Discovery of JVM processes on the local host.
//!
//! Candidates come from `pgrep -f "java.*<filter>"`; liveness is checked with
//! `kill(pid, 0)` and the command line is read from `/proc/<pid>/cmdline`.

use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::error::InventoryError;

const PGREP: &str = "pgrep";

/// Source of live process identifiers and their command lines.
#[async_trait]
pub trait ProcessInventory: Send + Sync {
    /// Lists pids of JVM processes whose command line matches `filter`.
    async fn list_candidate_pids(&self, filter: &str) -> Result<Vec<u32>, InventoryError>;

    /// Returns true while the process exists and can be signalled.
    fn is_alive(&self, pid: u32) -> bool;

    /// Returns the space-joined argument vector of the process.
    fn command_line(&self, pid: u32) -> Option<String>;
}

/// Inventory backed by `pgrep` and the `/proc` filesystem.
#[derive(Debug, Clone)]
pub struct PgrepInventory {
    proc_root: PathBuf,
}

impl PgrepInventory {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl Default for PgrepInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInventory for PgrepInventory {
    async fn list_candidate_pids(&self, filter: &str) -> Result<Vec<u32>, InventoryError> {
        let pattern = format!("java.*{filter}");
        let output = Command::new(PGREP)
            .arg("-f")
            .arg(&pattern)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| InventoryError::Spawn {
                program: PGREP.to_string(),
                source,
            })?;

        let pids = pgrep_result(&output)?;
        if pids.is_empty() {
            debug!("pgrep matched no processes for pattern {:?}", pattern);
        }
        Ok(pids)
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let raw = fs::read(self.proc_root.join(pid.to_string()).join("cmdline")).ok()?;
        let args = split_cmdline(&raw);
        if args.is_empty() {
            None
        } else {
            Some(args)
        }
    }
}

/// Signals the process with signal 0, which only performs the permission
/// and existence checks.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Zero and negative values address process groups.
    if raw <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 sends nothing and has no memory effects.
    unsafe { libc::kill(raw, 0) == 0 }
}

/// Maps a finished `pgrep` run to the candidate pids. Exit status 1 means
/// nothing matched and yields an empty set; any other failure is an error.
fn pgrep_result(output: &Output) -> Result<Vec<u32>, InventoryError> {
    match output.status.code() {
        Some(0) => Ok(parse_pid_list(&String::from_utf8_lossy(&output.stdout))),
        Some(1) => Ok(Vec::new()),
        _ => Err(InventoryError::Exit {
            program: PGREP.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
    }
}

/// Parses one pid per line, skipping anything that is not a number.
fn parse_pid_list(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Joins a NUL-separated `/proc/<pid>/cmdline` buffer with spaces.
fn split_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

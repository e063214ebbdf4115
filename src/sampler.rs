//! GC sampling through the JDK `jstat` tool.
//!
//! `jstat -gc <pid>` prints one header line of column names and one line of
//! values. Space columns (`S0C`, `EU`, `OC`, ...) are kilobytes, the
//! collection columns (`YGC`, `YGCT`, `FGC`, `FGCT`, `GCT`) are counts and
//! seconds accumulated since JVM start.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

use crate::error::{ParseError, SampleError};
use crate::snapshot::GcSnapshot;

/// Per-cycle sampler settings taken from one configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSettings {
    pub program: String,
    pub timeout: Duration,
}

/// Produces a raw GC snapshot for a single process.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self, pid: u32, settings: &SamplerSettings)
        -> Result<GcSnapshot, SampleError>;
}

/// Sampler that shells out to `jstat -gc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JstatSampler;

#[async_trait]
impl Sampler for JstatSampler {
    async fn sample(
        &self,
        pid: u32,
        settings: &SamplerSettings,
    ) -> Result<GcSnapshot, SampleError> {
        let mut cmd = Command::new(&settings.program);
        cmd.arg("-gc")
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child.
        let output = match tokio::time::timeout(settings.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| SampleError::Spawn {
                program: settings.program.clone(),
                source,
            })?,
            Err(_) => return Err(SampleError::Timeout(settings.timeout)),
        };

        if !output.status.success() {
            return Err(SampleError::Exit {
                program: settings.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("jstat output for pid {}: {:?}", pid, stdout);
        Ok(parse_jstat_output(&stdout)?)
    }
}

/// Parses the two-line `jstat -gc` output into a snapshot.
///
/// Blank lines are ignored. Values that are not finite numbers (jstat prints
/// `-` for spaces the running collector does not have) read as zero.
pub fn parse_jstat_output(text: &str) -> Result<GcSnapshot, ParseError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return Err(ParseError::TooFewLines(lines.len()));
    }

    let headers: Vec<&str> = lines[0].split_whitespace().collect();
    let values: Vec<&str> = lines[1].split_whitespace().collect();
    if headers.len() != values.len() {
        return Err(ParseError::ArityMismatch {
            headers: headers.len(),
            values: values.len(),
        });
    }

    let fields: HashMap<&str, f64> = headers
        .into_iter()
        .zip(values)
        .map(|(name, raw)| {
            let value = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            (name, value)
        })
        .collect();

    Ok(GcSnapshot::from_jstat_fields(&fields))
}

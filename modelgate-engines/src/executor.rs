//! Shared subprocess execution
//!
//! Engines run with stdin closed, output captured, and a hard timeout; an
//! expired process is killed rather than awaited.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use modelgate_core::domain::engine::EngineError;
use modelgate_core::domain::finding::EngineKind;

/// Buffer added to the engine timeout before the process is killed, so the
/// engine's own internal timeout handling gets a chance to report first.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Timeout for version probing
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+\.\d+)").expect("version pattern is valid")
});

/// Captured output of one engine subprocess
#[derive(Debug)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run an engine subprocess to completion under a hard timeout.
///
/// Exit codes are returned in-band; interpreting them is the adapter's job.
pub async fn run_engine(
    engine: EngineKind,
    executable: &str,
    args: &[&str],
    workdir: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, EngineError> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(engine = %engine, executable, ?args, "Invoking engine");

    let output = tokio::time::timeout(timeout + TIMEOUT_GRACE, cmd.output())
        .await
        .map_err(|_| EngineError::Timeout {
            engine,
            seconds: timeout.as_secs(),
        })?
        .map_err(|source| EngineError::Launch { engine, source })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    debug!(engine = %engine, exit_code, "Engine finished");
    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// Probe an engine's version by invoking it with the given flag and matching
/// the first `x.y.z` triple in its combined output.
///
/// Failures degrade to `"unknown"`: an unversioned engine can still scan.
pub async fn probe_version(executable: &str, flag: &str) -> String {
    let mut cmd = Command::new(executable);
    cmd.arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(executable, error = %e, "Version probe failed to launch");
            return "unknown".to_string();
        }
        Err(_) => {
            warn!(executable, "Version probe timed out");
            return "unknown".to_string();
        }
    };

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_version(&combined)
}

fn parse_version(text: &str) -> String {
    VERSION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

//! Modelscan adapter
//!
//! Invokes modelscan against a single model file with `-r json` and maps its
//! issue list onto normalized findings. The mapping is a pure function of the
//! native report.

pub mod output;

use std::path::Path;

use async_trait::async_trait;
use tracing::{instrument, warn};

use modelgate_core::config::EngineConfig;
use modelgate_core::domain::engine::{EngineError, ScanEngine};
use modelgate_core::domain::finding::{EngineKind, EngineResult, Finding, Severity};
use modelgate_core::domain::format::ModelKind;

use crate::executor::{probe_version, run_engine};
use output::{ModelscanIssue, ModelscanReport};

/// Structural model scanner adapter
pub struct ModelscanEngine {
    config: EngineConfig,
}

impl ModelscanEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

/// Fixed lookup from modelscan's severity vocabulary onto the canonical
/// four-level scale. Unknown labels map to High: an unclassified issue must
/// not be silently downgraded or dropped.
fn map_severity(native: &str) -> Severity {
    match native.to_ascii_uppercase().as_str() {
        "CRITICAL" => Severity::Critical,
        "HIGH" => Severity::High,
        "MEDIUM" => Severity::Medium,
        "LOW" => Severity::Low,
        _ => Severity::High,
    }
}

fn issue_to_finding(issue: &ModelscanIssue, relative_path: &str) -> Finding {
    let message = issue
        .description
        .clone()
        .or_else(|| issue.message.clone())
        .unwrap_or_else(|| "Unknown issue".to_string());

    let category = issue
        .scanner
        .clone()
        .or_else(|| issue.operator.clone())
        .unwrap_or_else(|| "unknown".to_string());

    Finding {
        engine: EngineKind::Modelscan,
        severity: map_severity(&issue.severity),
        category,
        unsafe_deserialization: false,
        message,
        path: relative_path.to_string(),
        raw: serde_json::to_value(issue).unwrap_or_default(),
    }
}

/// Map a full report onto findings for one scanned file.
pub fn normalize_report(report: &ModelscanReport, relative_path: &str) -> Vec<Finding> {
    report
        .issues
        .iter()
        .map(|issue| issue_to_finding(issue, relative_path))
        .collect()
}

#[async_trait]
impl ScanEngine for ModelscanEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Modelscan
    }

    fn supports(&self, _kind: ModelKind) -> bool {
        // Structural scanning applies to every supported model format.
        true
    }

    #[instrument(skip(self), fields(engine = "modelscan"))]
    async fn scan(&self, target: &Path, workdir: &Path) -> Result<EngineResult, EngineError> {
        let version = probe_version(&self.config.executable, "--version").await;

        let target_str = target.to_string_lossy();
        let out = run_engine(
            EngineKind::Modelscan,
            &self.config.executable,
            &["-p", target_str.as_ref(), "-r", "json"],
            workdir,
            self.config.timeout(),
        )
        .await?;

        // 0 = clean, 1 = issues found; anything else is a crash.
        if out.exit_code > 1 || out.exit_code < 0 {
            return Err(EngineError::Crashed {
                engine: EngineKind::Modelscan,
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }

        let report: ModelscanReport =
            serde_json::from_str(&out.stdout).map_err(|e| EngineError::UnparsableOutput {
                engine: EngineKind::Modelscan,
                detail: e.to_string(),
            })?;

        if !report.errors.is_empty() {
            warn!(errors = report.errors.len(), "modelscan reported scan errors");
        }

        let relative = target
            .strip_prefix(workdir)
            .unwrap_or(target)
            .to_string_lossy()
            .into_owned();
        let findings = normalize_report(&report, &relative);

        let raw_output = serde_json::to_value(&report).unwrap_or_default();
        Ok(EngineResult {
            engine: EngineKind::Modelscan,
            version,
            exit_code: out.exit_code,
            findings,
            raw_output,
            error: None,
        })
    }
}

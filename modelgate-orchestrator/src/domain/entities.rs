//! Orchestrator domain entities

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use modelgate_core::domain::finding::{Finding, Severity};
use modelgate_core::domain::verdict::{PassFail, Verdict};

use super::value_objects::{JobOptions, JobSource, JobStatus, JobTransition, JobTransitionError};

/// Number of findings embedded in the summary record; the full sequence
/// stays in the raw engine artifacts.
pub const TOP_FINDINGS_LIMIT: usize = 20;

/// A scan job and its result summary.
///
/// This is the record persisted as `summary.json` — its field names and
/// nesting are a stable contract for external tooling. The job is mutated
/// only by the single worker that owns it; readers always observe a
/// last-committed clone.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanJob {
    pub job_id: Uuid,
    pub source: JobSource,
    /// Display name: the sanitized upload filename or the mounted path
    pub filename: String,
    /// Extension of the primary file
    pub file_extension: String,
    /// SHA-256 of the primary file
    pub sha256: String,
    /// Total size of all input files in bytes
    pub file_size: u64,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Policy verdict; present exactly when the pipeline ran to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_fail: Option<PassFail>,
    /// When the verdict is FAIL, the triggering finding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    /// Pipeline malfunction detail; never set for a clean FAIL verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub engines_run: Vec<String>,
    #[serde(default)]
    pub engine_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub total_findings: usize,
    #[serde(default)]
    pub findings_by_severity: BTreeMap<Severity, usize>,
    #[serde(default)]
    pub findings_by_engine: BTreeMap<String, usize>,
    #[serde(default)]
    pub top_findings: Vec<Finding>,
    /// Recoverable degradations: skipped engines, per-file engine failures
    #[serde(default)]
    pub warnings: Vec<String>,
    pub options: JobOptions,
    /// Ordered history of state transitions (audit trail)
    #[serde(default)]
    pub transitions: Vec<JobTransition>,
}

impl ScanJob {
    pub fn new(
        source: JobSource,
        filename: String,
        file_extension: String,
        sha256: String,
        file_size: u64,
        options: JobOptions,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            source,
            filename,
            file_extension,
            sha256,
            file_size,
            status: JobStatus::Queued,
            started_at: Utc::now(),
            finished_at: None,
            pass_fail: None,
            fail_reason: None,
            error: None,
            engines_run: Vec::new(),
            engine_versions: BTreeMap::new(),
            total_findings: 0,
            findings_by_severity: BTreeMap::new(),
            findings_by_engine: BTreeMap::new(),
            top_findings: Vec::new(),
            warnings: Vec::new(),
            options,
            transitions: Vec::new(),
        }
    }

    /// Validated state transition, recorded on the audit trail.
    pub fn transition(
        &mut self,
        to: JobStatus,
        reason: Option<String>,
    ) -> Result<(), JobTransitionError> {
        if !self.status.can_transition_to(&to) {
            return Err(JobTransitionError {
                from: self.status,
                to,
            });
        }
        self.transitions.push(JobTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason,
        });
        self.status = to;
        Ok(())
    }

    /// Fold the policy verdict and the full finding sequence into the record.
    pub fn apply_verdict(&mut self, verdict: &Verdict, findings: &[Finding]) {
        self.pass_fail = Some(verdict.pass_fail);
        self.fail_reason = verdict.reason.clone();
        self.total_findings = verdict.total_findings;
        self.findings_by_severity = verdict.findings_by_severity.clone();

        self.findings_by_engine.clear();
        for finding in findings {
            *self
                .findings_by_engine
                .entry(finding.engine.as_str().to_string())
                .or_insert(0) += 1;
        }
        self.top_findings = findings.iter().take(TOP_FINDINGS_LIMIT).cloned().collect();
    }

    pub fn record_engine(&mut self, name: &str, version: &str) {
        if !self.engines_run.iter().any(|e| e == name) {
            self.engines_run.push(name.to_string());
            self.engine_versions
                .insert(name.to_string(), version.to_string());
        }
    }
}

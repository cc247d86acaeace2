//! Orchestrator value objects

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a worker slot
    Queued,
    /// A worker owns the job and is executing the pipeline
    Running,
    /// Pipeline completed; the verdict (PASS or FAIL) is recorded
    Succeeded,
    /// Pipeline malfunctioned, or the policy verdict is FAIL
    Failed,
    /// Tombstone: record and artifacts removed by explicit request
    Deleted,
}

impl JobStatus {
    /// Returns the set of valid target states from the current state.
    ///
    /// ```text
    /// Queued ──► Running ──► Succeeded ──► Deleted
    ///                  └───► Failed ─────► Deleted
    /// ```
    ///
    /// No state is ever re-entered.
    pub fn valid_transitions(&self) -> &[JobStatus] {
        match self {
            Self::Queued => &[Self::Running],
            Self::Running => &[Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed => &[Self::Deleted],
            Self::Deleted => &[],
        }
    }

    /// Check whether transitioning to `target` is allowed from this state.
    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Whether this status is terminal (pipeline no longer owns the job).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Recorded state transition for a scan job (audit trail).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Human-readable reason or context for the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an invalid status transition is attempted.
#[derive(Debug, thiserror::Error)]
#[error("Invalid job transition from {from} to {to}")]
pub struct JobTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Per-job scan options
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct JobOptions {
    pub enable_picklescan: bool,
    pub strict_policy: bool,
    /// Generate the AI-SBOM even when the verdict is FAIL
    pub run_sbom_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            enable_picklescan: true,
            strict_policy: true,
            run_sbom_on_fail: true,
        }
    }
}

/// Where the scanned artifact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSource {
    /// Uploaded file, identified by its sanitized original filename
    Upload { filename: String },
    /// Path relative to the read-only mounted model directory
    Mounted { path: String },
}

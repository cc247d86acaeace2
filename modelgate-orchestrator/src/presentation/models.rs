//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use modelgate_core::domain::verdict::PassFail;

use crate::domain::entities::ScanJob;
use crate::domain::value_objects::JobStatus;
use crate::infrastructure::mounted::MountedModel;

/// Response after creating a scan job
#[derive(Serialize, ToSchema)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Response for a job status query
#[derive(Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// Full summary record (the `summary.json` contract)
    pub summary: ScanJob,
    /// Pipeline malfunction detail, when the job failed to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ScanJob> for JobStatusResponse {
    fn from(job: ScanJob) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            error: job.error.clone(),
            summary: job,
        }
    }
}

/// Item in the job listing
#[derive(Serialize, ToSchema)]
pub struct JobListItem {
    pub job_id: Uuid,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_fail: Option<PassFail>,
}

impl From<&ScanJob> for JobListItem {
    fn from(job: &ScanJob) -> Self {
        Self {
            job_id: job.job_id,
            filename: job.filename.clone(),
            status: job.status,
            created_at: job.started_at,
            pass_fail: job.pass_fail,
        }
    }
}

/// Response listing jobs, newest first
#[derive(Serialize, ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobListItem>,
    pub total: usize,
}

/// Information about one artifact file
#[derive(Serialize, ToSchema)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// Response listing a job's artifacts
#[derive(Serialize, ToSchema)]
pub struct ArtifactsResponse {
    pub job_id: Uuid,
    pub artifacts: Vec<ArtifactInfo>,
}

/// Response listing mounted models
#[derive(Serialize, ToSchema)]
pub struct MountedModelsResponse {
    pub models: Vec<MountedModel>,
    pub total: usize,
}

/// Request to scan a mounted model path
#[derive(Deserialize, ToSchema)]
pub struct ScanMountedRequest {
    /// Path relative to the mounted model root
    #[schema(example = "llama-7b/weights.safetensors")]
    pub path: String,
    /// Override the configured picklescan default
    pub enable_picklescan: Option<bool>,
    /// Override the configured strict-policy default
    pub strict_policy: Option<bool>,
    /// Override the configured SBOM-on-fail default
    pub run_sbom_on_fail: Option<bool>,
}

/// Deletion confirmation
#[derive(Serialize, ToSchema)]
pub struct DeleteJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Error body for all non-2xx API responses
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Health probe body
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

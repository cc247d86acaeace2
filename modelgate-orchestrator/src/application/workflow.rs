//! Job workflow — centralised state-machine controller for scan jobs.
//!
//! Every status transition goes through [`JobWorkflow`], which validates the
//! transition against the state machine on
//! [`JobStatus`](crate::domain::value_objects::JobStatus), records an
//! audit-trail entry, and persists the updated summary. Workers call this
//! instead of mutating job status directly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use modelgate_core::domain::verdict::{PassFail, Verdict};

use crate::domain::entities::ScanJob;
use crate::domain::value_objects::{JobStatus, JobTransitionError};
use crate::infrastructure::job_store::{JobStore, JobStoreError};

/// Errors from the workflow layer.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] JobTransitionError),

    #[error("Persistence error: {0}")]
    Store(#[from] JobStoreError),
}

/// Centralised job lifecycle controller.
#[derive(Clone)]
pub struct JobWorkflow {
    job_store: Arc<dyn JobStore>,
}

impl JobWorkflow {
    pub fn new(job_store: Arc<dyn JobStore>) -> Self {
        Self { job_store }
    }

    /// Transition a job to `Running` and persist.
    pub async fn start_job(&self, job: &mut ScanJob) -> Result<(), WorkflowError> {
        job.transition(JobStatus::Running, Some("Worker started execution".into()))?;
        self.job_store.save(job.clone()).await?;
        info!(job_id = %job.job_id, "Job transitioned to Running");
        Ok(())
    }

    /// Terminate a job that ran its pipeline to completion.
    ///
    /// A PASS verdict lands in `Succeeded`; a FAIL verdict lands in `Failed`
    /// with the verdict recorded and `error` left empty — a clean FAIL is a
    /// policy outcome, not a pipeline malfunction.
    pub async fn finish_job(&self, job: &mut ScanJob, verdict: &Verdict) -> Result<(), WorkflowError> {
        job.finished_at = Some(Utc::now());
        let (target, reason) = match verdict.pass_fail {
            PassFail::Pass => (
                JobStatus::Succeeded,
                format!("Verdict PASS with {} findings", verdict.total_findings),
            ),
            PassFail::Fail => (
                JobStatus::Failed,
                format!(
                    "Verdict FAIL: {}",
                    verdict.reason.as_deref().unwrap_or("policy violation")
                ),
            ),
        };
        job.transition(target, Some(reason))?;
        self.job_store.save(job.clone()).await?;
        info!(job_id = %job.job_id, verdict = %verdict.pass_fail, "Job reached terminal state");
        Ok(())
    }

    /// Terminate a job whose pipeline malfunctioned.
    pub async fn fail_job(
        &self,
        job: &mut ScanJob,
        stage: &str,
        error: &str,
    ) -> Result<(), WorkflowError> {
        job.finished_at = Some(Utc::now());
        job.error = Some(format!("{stage}: {error}"));
        job.transition(JobStatus::Failed, Some(format!("Pipeline failed at {stage}")))?;
        self.job_store.save(job.clone()).await?;
        warn!(job_id = %job.job_id, stage, error, "Job transitioned to Failed");
        Ok(())
    }
}

//! Background worker pool
//!
//! A single dispatcher drains the FIFO job queue. It acquires a concurrency
//! permit *before* popping, so admission order is preserved and the number of
//! running jobs can never exceed the configured bound. Upload scans and
//! mounted-path scans share the same pool.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::pipeline::ScanPipeline;
use crate::application::workflow::{JobWorkflow, WorkflowError};
use crate::infrastructure::artifacts;
use crate::infrastructure::job_store::{JobStore, JobStoreError};

/// Errors that can occur when enqueuing a job.
#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("Job queue is closed")]
    Closed,
}

/// Handle that allows HTTP handlers to push accepted jobs into the pool.
#[derive(Clone)]
pub struct JobQueueHandle {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl JobQueueHandle {
    pub fn enqueue(&self, job_id: Uuid) -> Result<(), JobQueueError> {
        self.tx.send(job_id).map_err(|_| JobQueueError::Closed)
    }
}

/// Create the FIFO job queue.
pub fn job_queue() -> (JobQueueHandle, mpsc::UnboundedReceiver<Uuid>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobQueueHandle { tx }, rx)
}

/// Shared dependencies required by the job workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub job_store: Arc<dyn JobStore>,
    pub workflow: JobWorkflow,
    pub pipeline: Arc<ScanPipeline>,
    pub uploads_root: PathBuf,
    pub results_root: PathBuf,
}

/// Errors surfaced while executing background jobs.
#[derive(Debug, thiserror::Error)]
pub enum JobProcessingError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Store error: {0}")]
    Store(#[from] JobStoreError),
}

/// Spawn the worker pool that consumes queued jobs.
pub fn spawn_job_worker_pool(
    context: JobWorkerContext,
    mut rx: mpsc::UnboundedReceiver<Uuid>,
    max_concurrent_jobs: usize,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let concurrency = max_concurrent_jobs.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    tokio::spawn(async move {
        info!(concurrency, "Job worker pool started");

        loop {
            // Hold a permit before popping so FIFO admission is preserved.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    drop(permit);
                    break;
                }
                next = rx.recv() => match next {
                    Some(job_id) => {
                        let ctx = context.clone();
                        tokio::spawn(async move {
                            if let Err(err) = process_job(ctx, job_id).await {
                                error!(job_id = %job_id, error = %err, "Background job processing failed");
                            }
                            drop(permit);
                        });
                    }
                    None => {
                        drop(permit);
                        break;
                    }
                },
            }
        }

        warn!("Job worker pool exiting");
    })
}

async fn process_job(ctx: JobWorkerContext, job_id: Uuid) -> Result<(), JobProcessingError> {
    let Some(mut job) = ctx.job_store.get(job_id).await? else {
        warn!(job_id = %job_id, "Queued job no longer exists");
        return Ok(());
    };

    info!(job_id = %job_id, filename = %job.filename, "Processing scan job");
    ctx.workflow.start_job(&mut job).await?;

    let upload_dir = artifacts::job_upload_dir(&ctx.uploads_root, job_id);
    let results_dir = artifacts::job_results_dir(&ctx.results_root, job_id);

    match ctx.pipeline.execute(&mut job, &upload_dir, &results_dir).await {
        Ok(verdict) => {
            let bundle_dir = results_dir.clone();
            let bundled = tokio::task::spawn_blocking(move || artifacts::bundle(&bundle_dir))
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))
                .and_then(|r| r);

            match bundled {
                Ok(_) => {
                    ctx.workflow.finish_job(&mut job, &verdict).await?;
                    info!(job_id = %job_id, verdict = %verdict.pass_fail, "Scan job finished");
                }
                Err(e) => {
                    // Persistence failure is fatal even after a clean scan.
                    ctx.workflow
                        .fail_job(&mut job, "persist", &format!("artifact bundling failed: {e}"))
                        .await?;
                }
            }
        }
        Err(err) => {
            // Remove partial outputs; the summary record itself stays.
            let clean_dir = results_dir.clone();
            let _ = tokio::task::spawn_blocking(move || artifacts::clean_partial(&clean_dir)).await;

            ctx.workflow
                .fail_job(&mut job, err.stage(), &err.to_string())
                .await?;
            warn!(job_id = %job_id, error = %err, "Scan job failed");
        }
    }

    Ok(())
}

//! Retention sweep
//!
//! Periodically removes terminal jobs older than the retention window,
//! together with their upload and results directories. This is garbage
//! collection, not a state-machine transition: jobs that are queued or
//! running are never touched, so the sweep cannot race an active worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::artifacts;
use crate::infrastructure::job_store::JobStore;

/// Spawn the background retention sweep.
pub fn spawn_retention_sweep(
    job_store: Arc<dyn JobStore>,
    uploads_root: PathBuf,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = interval.as_secs(),
            "Retention sweep started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = sweep_once(job_store.as_ref(), &uploads_root, retention).await;
                    if removed > 0 {
                        info!(removed, "Retention sweep removed expired jobs");
                    }
                }
            }
        }

        info!("Retention sweep exiting");
    })
}

/// One sweep pass; returns the number of jobs removed.
pub async fn sweep_once(
    job_store: &dyn JobStore,
    uploads_root: &PathBuf,
    retention: Duration,
) -> usize {
    let jobs = match job_store.list().await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "Retention sweep could not list jobs");
            return 0;
        }
    };

    let cutoff = chrono::Utc::now()
        - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
    let mut removed = 0usize;

    for job in jobs {
        if !job.status.is_terminal() {
            continue;
        }
        let Some(finished_at) = job.finished_at else {
            continue;
        };
        if finished_at >= cutoff {
            continue;
        }

        match job_store.remove(job.job_id).await {
            Ok(()) => {
                let upload_dir = artifacts::job_upload_dir(uploads_root, job.job_id);
                if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(job_id = %job.job_id, error = %e, "Failed to remove expired upload directory");
                    }
                }
                removed += 1;
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Failed to remove expired job");
            }
        }
    }

    removed
}

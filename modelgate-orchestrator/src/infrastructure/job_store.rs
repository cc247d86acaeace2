//! Job registry with on-disk summary persistence
//!
//! The registry is an in-process map: each entry is mutated only by the
//! worker that owns the job, so readers never need more than a clone of the
//! last-committed record. Every save also publishes `summary.json` into the
//! job's results directory (write-to-temp-then-rename) so records survive a
//! restart and external tooling can read them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::entities::ScanJob;
use crate::infrastructure::artifacts;

/// Job persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Job storage interface.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job: ScanJob) -> Result<(), JobStoreError>;
    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>, JobStoreError>;
    async fn list(&self) -> Result<Vec<ScanJob>, JobStoreError>;
    /// Remove the record and its results directory. Irreversible.
    async fn remove(&self, job_id: Uuid) -> Result<(), JobStoreError>;
}

/// In-memory registry backed by per-job `summary.json` files.
pub struct FileBackedJobStore {
    results_root: PathBuf,
    jobs: RwLock<HashMap<Uuid, ScanJob>>,
}

impl FileBackedJobStore {
    pub fn new(results_root: PathBuf) -> Self {
        Self {
            results_root,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Build a store preloaded with every parsable summary under
    /// `results_root`. Unreadable entries are skipped with a warning.
    pub fn load_existing(results_root: PathBuf) -> Arc<Self> {
        let mut jobs = HashMap::new();

        if let Ok(entries) = std::fs::read_dir(&results_root) {
            for entry in entries.flatten() {
                let summary_path = entry.path().join(artifacts::SUMMARY_ARTIFACT);
                if !summary_path.is_file() {
                    continue;
                }
                match std::fs::read(&summary_path)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| {
                        serde_json::from_slice::<ScanJob>(&bytes).map_err(|e| e.to_string())
                    }) {
                    Ok(job) => {
                        jobs.insert(job.job_id, job);
                    }
                    Err(e) => {
                        warn!(path = %summary_path.display(), error = %e, "Skipping unreadable job summary");
                    }
                }
            }
        }

        info!(count = jobs.len(), "Loaded existing jobs");
        Arc::new(Self {
            results_root,
            jobs: RwLock::new(jobs),
        })
    }

    fn results_dir(&self, job_id: Uuid) -> PathBuf {
        self.results_root.join(job_id.to_string())
    }
}

#[async_trait]
impl JobStore for FileBackedJobStore {
    async fn save(&self, job: ScanJob) -> Result<(), JobStoreError> {
        let value =
            serde_json::to_value(&job).map_err(|e| JobStoreError::Serialization(e.to_string()))?;
        let results_dir = self.results_dir(job.job_id);
        let job_id = job.job_id;

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&results_dir)?;
            artifacts::publish_json(&results_dir, artifacts::SUMMARY_ARTIFACT, &value)
        })
        .await
        .map_err(|e| JobStoreError::Serialization(e.to_string()))??;

        self.jobs.write().await.insert(job_id, job);
        debug!(job_id = %job_id, "Job summary saved");
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>, JobStoreError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScanJob>, JobStoreError> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), JobStoreError> {
        if self.jobs.write().await.remove(&job_id).is_none() {
            return Err(JobStoreError::NotFound(job_id));
        }

        let results_dir = self.results_dir(job_id);
        match tokio::fs::remove_dir_all(&results_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(job_id = %job_id, "Job record and artifacts removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{JobOptions, JobSource};

    fn test_job() -> ScanJob {
        ScanJob::new(
            JobSource::Upload {
                filename: "model.pkl".to_string(),
            },
            "model.pkl".to_string(),
            ".pkl".to_string(),
            "hash".to_string(),
            1,
            JobOptions::default(),
        )
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedJobStore::new(dir.path().to_path_buf());

        let job = test_job();
        let id = job.job_id;
        store.save(job).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "model.pkl");
        assert!(dir
            .path()
            .join(id.to_string())
            .join(artifacts::SUMMARY_ARTIFACT)
            .is_file());
    }

    #[tokio::test]
    async fn load_existing_recovers_persisted_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileBackedJobStore::new(dir.path().to_path_buf());
            let job = test_job();
            let id = job.job_id;
            store.save(job).await.unwrap();
            id
        };

        let reloaded = FileBackedJobStore::load_existing(dir.path().to_path_buf());
        let job = reloaded.get(id).await.unwrap().unwrap();
        assert_eq!(job.job_id, id);
    }

    #[tokio::test]
    async fn remove_deletes_record_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedJobStore::new(dir.path().to_path_buf());

        let job = test_job();
        let id = job.job_id;
        store.save(job).await.unwrap();

        store.remove(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
        assert!(!dir.path().join(id.to_string()).exists());

        let err = store.remove(id).await.unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }
}

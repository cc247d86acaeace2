//! Job creation use cases
//!
//! Requests are validated here, before a job record exists: an unsupported
//! format or an escaping mounted path is rejected immediately and never
//! reaches the queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use modelgate_core::config::MountedModelsConfig;
use modelgate_core::domain::format;
use modelgate_core::infrastructure::hashing::sha256_file;

use crate::application::pipeline::InputError;
use crate::domain::entities::ScanJob;
use crate::domain::value_objects::{JobOptions, JobSource};
use crate::infrastructure::artifacts;
use crate::infrastructure::job_store::{JobStore, JobStoreError};
use crate::infrastructure::mounted::{self, MountedPathError};
use crate::infrastructure::worker::{JobQueueError, JobQueueHandle};

/// Errors from job creation.
#[derive(Debug, thiserror::Error)]
pub enum CreateJobError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Mounted model scanning is not configured")]
    MountedDisabled,

    #[error(transparent)]
    MountedPath(#[from] MountedPathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Queue(#[from] JobQueueError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Accepts scan requests, allocates the job record, and enqueues it.
pub struct CreateScanJobUseCase {
    job_store: Arc<dyn JobStore>,
    queue: JobQueueHandle,
    uploads_root: PathBuf,
    mounted: MountedModelsConfig,
}

impl CreateScanJobUseCase {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        queue: JobQueueHandle,
        uploads_root: PathBuf,
        mounted: MountedModelsConfig,
    ) -> Self {
        Self {
            job_store,
            queue,
            uploads_root,
            mounted,
        }
    }

    /// Create a job for an uploaded file already staged on disk.
    ///
    /// Takes ownership of `staged`: it is moved into the job's upload
    /// directory on success and removed on rejection.
    pub async fn create_upload_job(
        &self,
        staged: PathBuf,
        original_filename: &str,
        options: JobOptions,
    ) -> Result<Uuid, CreateJobError> {
        let filename = sanitize_filename(original_filename);
        let extension = format::file_extension(&filename);
        let is_archive = format::archive_kind_from_name(&filename).is_some();

        if !is_archive && format::model_kind_from_name(&filename).is_none() {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(InputError::UnsupportedFormat { name: filename }.into());
        }

        let hash_path = staged.clone();
        let (sha256, size) = tokio::task::spawn_blocking(move || {
            let sha256 = sha256_file(&hash_path)?;
            let size = std::fs::metadata(&hash_path)?.len();
            Ok::<_, std::io::Error>((sha256, size))
        })
        .await
        .map_err(|e| CreateJobError::Internal(e.to_string()))??;

        let job = ScanJob::new(
            JobSource::Upload {
                filename: filename.clone(),
            },
            filename.clone(),
            extension.clone(),
            sha256,
            size,
            options,
        );
        let job_id = job.job_id;

        let upload_dir = artifacts::job_upload_dir(&self.uploads_root, job_id);
        tokio::fs::create_dir_all(&upload_dir).await?;
        let dest = upload_dir.join(if is_archive {
            format!("archive{extension}")
        } else {
            format!("model{extension}")
        });

        let move_src = staged.clone();
        tokio::task::spawn_blocking(move || move_file(&move_src, &dest))
            .await
            .map_err(|e| CreateJobError::Internal(e.to_string()))??;

        self.job_store.save(job).await?;
        self.queue.enqueue(job_id)?;
        info!(job_id = %job_id, filename = %filename, "Created upload scan job");
        Ok(job_id)
    }

    /// Create a job for a path inside the mounted model directory.
    pub async fn create_mounted_job(
        &self,
        relative_path: &str,
        options: JobOptions,
    ) -> Result<Uuid, CreateJobError> {
        let root = self
            .mounted
            .root
            .as_ref()
            .ok_or(CreateJobError::MountedDisabled)?;

        let resolved = mounted::resolve(root, relative_path)?;
        let model_files = mounted::collect_model_files(&resolved, self.mounted.max_depth);
        if model_files.is_empty() {
            return Err(InputError::NoModelFiles.into());
        }

        let primary = model_files[0].clone();
        let sizes: Vec<PathBuf> = model_files.clone();
        let (sha256, total_size) = tokio::task::spawn_blocking(move || {
            let sha256 = sha256_file(&primary)?;
            let mut total = 0u64;
            for file in &sizes {
                total += std::fs::metadata(file)?.len();
            }
            Ok::<_, std::io::Error>((sha256, total))
        })
        .await
        .map_err(|e| CreateJobError::Internal(e.to_string()))??;

        let display_name = if model_files.len() > 1 {
            format!("{relative_path} ({} files)", model_files.len())
        } else {
            relative_path.to_string()
        };
        let primary_name = model_files[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let job = ScanJob::new(
            JobSource::Mounted {
                path: relative_path.to_string(),
            },
            display_name,
            format::file_extension(&primary_name),
            sha256,
            total_size,
            options,
        );
        let job_id = job.job_id;

        let upload_dir = artifacts::job_upload_dir(&self.uploads_root, job_id);
        tokio::fs::create_dir_all(&upload_dir).await?;
        for (index, source) in model_files.iter().enumerate() {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let link = upload_dir.join(format!("model_{index}{}", format::file_extension(&name)));
            let source = source.clone();
            tokio::task::spawn_blocking(move || link_or_copy(&source, &link))
                .await
                .map_err(|e| CreateJobError::Internal(e.to_string()))??;
        }

        self.job_store.save(job).await?;
        self.queue.enqueue(job_id)?;
        info!(job_id = %job_id, path = relative_path, "Created mounted scan job");
        Ok(job_id)
    }
}

/// Strip path components and unsafe characters from an upload filename.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "model_file".to_string()
    } else {
        sanitized
    }
}

/// Move a staged file, falling back to copy+remove across filesystems.
fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)
        }
    }
}

/// Symlink when the platform allows it, copy otherwise. The mounted root is
/// read-only, so a link keeps large models from being duplicated.
fn link_or_copy(src: &Path, dest: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(src, dest).is_ok() {
            return Ok(());
        }
    }
    std::fs::copy(src, dest).map(|_| ())
}

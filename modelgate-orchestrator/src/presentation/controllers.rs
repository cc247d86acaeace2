//! Request handlers

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use modelgate_core::Config;

use crate::application::use_cases::{CreateJobError, CreateScanJobUseCase};
use crate::domain::value_objects::{JobOptions, JobStatus};
use crate::infrastructure::artifacts;
use crate::infrastructure::job_store::JobStore;
use crate::infrastructure::mounted::{self, MountedPathError};
use crate::presentation::models::*;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub job_store: Arc<dyn JobStore>,
    pub create_jobs: Arc<CreateScanJobUseCase>,
    pub config: Arc<Config>,
}

/// API-level error, rendered as `{"detail": ...}` with the matching status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::Conflict(detail) => (StatusCode::CONFLICT, detail),
            Self::PayloadTooLarge(detail) => (StatusCode::PAYLOAD_TOO_LARGE, detail),
            Self::Internal(detail) => {
                error!(detail = %detail, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<CreateJobError> for ApiError {
    fn from(err: CreateJobError) -> Self {
        match err {
            CreateJobError::Input(e) => Self::BadRequest(e.to_string()),
            CreateJobError::MountedDisabled => {
                Self::BadRequest("Mounted model scanning is not configured".to_string())
            }
            CreateJobError::MountedPath(MountedPathError::Traversal) => {
                Self::BadRequest("Path escapes the mounted model root".to_string())
            }
            CreateJobError::MountedPath(MountedPathError::NotFound(path)) => {
                Self::NotFound(format!("Mounted path not found: {path}"))
            }
            CreateJobError::Io(e) => Self::Internal(e.to_string()),
            CreateJobError::Store(e) => Self::Internal(e.to_string()),
            CreateJobError::Queue(e) => Self::Internal(e.to_string()),
            CreateJobError::Internal(e) => Self::Internal(e),
        }
    }
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "modelgate",
    })
}

/// POST /api/jobs - upload a model artifact and start scanning
#[utoipa::path(
    post,
    path = "/api/jobs",
    responses(
        (status = 200, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Unsupported or missing file", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size cap", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateJobResponse>, ApiError> {
    let policy = &state.config.policy;
    let mut options = JobOptions {
        enable_picklescan: policy.enable_picklescan_default,
        strict_policy: policy.strict_default,
        run_sbom_on_fail: policy.run_sbom_on_fail,
    };
    let mut staged: Option<(PathBuf, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("No filename provided".to_string()))?;
                let path = stage_upload(&state, field).await?;
                staged = Some((path, filename));
            }
            Some("enable_picklescan") => {
                options.enable_picklescan = parse_bool_field(field).await?;
            }
            Some("strict_policy") => {
                options.strict_policy = parse_bool_field(field).await?;
            }
            Some("run_sbom_on_fail") => {
                options.run_sbom_on_fail = parse_bool_field(field).await?;
            }
            _ => {}
        }
    }

    let (path, filename) =
        staged.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let job_id = state
        .create_jobs
        .create_upload_job(path, &filename, options)
        .await?;

    Ok(Json(CreateJobResponse {
        job_id,
        status: JobStatus::Queued,
        message: "Job created successfully".to_string(),
    }))
}

/// Stream one multipart field to a staging file, enforcing the upload cap.
async fn stage_upload(
    state: &AppState,
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<PathBuf, ApiError> {
    use tokio::io::AsyncWriteExt;

    let uploads_root = state.config.storage.uploads_dir();
    tokio::fs::create_dir_all(&uploads_root)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = uploads_root.join(format!(".staging-upload-{}", Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut total: u64 = 0;
    let cap = state.config.storage.max_upload_bytes;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ApiError::BadRequest(format!("Upload aborted: {e}")));
            }
        };
        total += chunk.len() as u64;
        if total > cap {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large. Maximum size: {cap} bytes"
            )));
        }
        if let Err(e) = file.write_all(&chunk).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ApiError::Internal(e.to_string()));
        }
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(path)
}

async fn parse_bool_field(field: axum::extract::multipart::Field<'_>) -> Result<bool, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed field: {e}")))?;
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" | "" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "Expected a boolean, got '{other}'"
        ))),
    }
}

#[derive(Deserialize)]
pub struct ListJobsParams {
    pub limit: Option<usize>,
}

/// GET /api/jobs - list jobs, newest first
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(("limit" = Option<usize>, Query, description = "Maximum entries to return")),
    responses((status = 200, description = "Job listing", body = JobListResponse)),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>, ApiError> {
    let mut jobs = state
        .job_store
        .list()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    jobs.truncate(params.limit.unwrap_or(100));

    let items: Vec<JobListItem> = jobs.iter().map(JobListItem::from).collect();
    let total = items.len();
    Ok(Json(JobListResponse { jobs: items, total }))
}

/// GET /api/jobs/{id} - job status and summary
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job found", body = JobStatusResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .job_store
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
    Ok(Json(job.into()))
}

/// GET /api/jobs/{id}/artifacts - list artifact files
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/artifacts",
    params(("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Artifact listing", body = ArtifactsResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    ensure_job_exists(&state, id).await?;

    let results_dir = artifacts::job_results_dir(&state.config.storage.results_dir(), id);
    let entries = tokio::task::spawn_blocking(move || artifacts::list(&results_dir))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .unwrap_or_default();

    let files = entries
        .into_iter()
        .map(|(name, size)| ArtifactInfo {
            content_type: artifacts::content_type(&name).to_string(),
            name,
            size,
        })
        .collect();
    Ok(Json(ArtifactsResponse {
        job_id: id,
        artifacts: files,
    }))
}

/// GET /api/jobs/{id}/download/{name} - download one artifact
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/download/{name}",
    params(
        ("id" = Uuid, Path, description = "Job ID"),
        ("name" = String, Path, description = "Artifact file name")
    ),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 404, description = "Job or artifact not found", body = ErrorResponse)
    ),
    tag = "artifacts"
)]
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    ensure_job_exists(&state, id).await?;

    let results_dir = artifacts::job_results_dir(&state.config.storage.results_dir(), id);
    let path = artifacts::artifact_path(&results_dir, &name)
        .ok_or_else(|| ApiError::NotFound("Artifact not found".to_string()))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            artifacts::content_type(&name).to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// DELETE /api/jobs/{id} - remove a terminal job and its artifacts
#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job deleted", body = DeleteJobResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is still running", body = ErrorResponse)
    ),
    tag = "jobs"
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteJobResponse>, ApiError> {
    let job = state
        .job_store
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    // Deletion is only reachable from a terminal state; a running job is
    // being written by its worker and must not be pulled out from under it.
    if !job.status.can_transition_to(&JobStatus::Deleted) {
        return Err(ApiError::Conflict(format!(
            "Job is {}; wait for it to reach a terminal state",
            job.status
        )));
    }

    state
        .job_store
        .remove(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let upload_dir = artifacts::job_upload_dir(&state.config.storage.uploads_dir(), id);
    if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            error!(job_id = %id, error = %e, "Failed to remove upload directory");
        }
    }

    Ok(Json(DeleteJobResponse {
        job_id: id,
        status: JobStatus::Deleted,
    }))
}

/// GET /api/models - list mounted models
#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "Mounted model listing", body = MountedModelsResponse),
        (status = 400, description = "Mounted scanning not configured", body = ErrorResponse)
    ),
    tag = "models"
)]
pub async fn list_mounted_models(
    State(state): State<AppState>,
) -> Result<Json<MountedModelsResponse>, ApiError> {
    let Some(root) = state.config.models.root.clone() else {
        return Err(ApiError::BadRequest(
            "Mounted model scanning is not configured".to_string(),
        ));
    };
    let max_depth = state.config.models.max_depth;

    let models = tokio::task::spawn_blocking(move || mounted::list_models(&root, max_depth))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let total = models.len();
    Ok(Json(MountedModelsResponse { models, total }))
}

/// POST /api/models/scan - scan a mounted model path
#[utoipa::path(
    post,
    path = "/api/models/scan",
    request_body = ScanMountedRequest,
    responses(
        (status = 200, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Invalid path", body = ErrorResponse),
        (status = 404, description = "Path not found", body = ErrorResponse)
    ),
    tag = "models"
)]
pub async fn scan_mounted_model(
    State(state): State<AppState>,
    Json(request): Json<ScanMountedRequest>,
) -> Result<Json<CreateJobResponse>, ApiError> {
    let policy = &state.config.policy;
    let options = JobOptions {
        enable_picklescan: request
            .enable_picklescan
            .unwrap_or(policy.enable_picklescan_default),
        strict_policy: request.strict_policy.unwrap_or(policy.strict_default),
        run_sbom_on_fail: request.run_sbom_on_fail.unwrap_or(policy.run_sbom_on_fail),
    };

    let job_id = state
        .create_jobs
        .create_mounted_job(&request.path, options)
        .await?;

    Ok(Json(CreateJobResponse {
        job_id,
        status: JobStatus::Queued,
        message: "Job created successfully".to_string(),
    }))
}

async fn ensure_job_exists(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    state
        .job_store
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))
}

//! Route definitions

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::presentation::controllers::{
    create_job, delete_job, download_artifact, get_job, health, list_artifacts, list_jobs,
    list_mounted_models, scan_mounted_model, AppState,
};
use crate::presentation::models::*;

/// OpenAPI documentation, served as JSON at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::health,
        crate::presentation::controllers::create_job,
        crate::presentation::controllers::list_jobs,
        crate::presentation::controllers::get_job,
        crate::presentation::controllers::list_artifacts,
        crate::presentation::controllers::download_artifact,
        crate::presentation::controllers::delete_job,
        crate::presentation::controllers::list_mounted_models,
        crate::presentation::controllers::scan_mounted_model,
    ),
    components(schemas(
        CreateJobResponse,
        JobStatusResponse,
        JobListItem,
        JobListResponse,
        ArtifactInfo,
        ArtifactsResponse,
        MountedModelsResponse,
        ScanMountedRequest,
        DeleteJobResponse,
        ErrorResponse,
        HealthResponse,
    )),
    tags(
        (name = "jobs", description = "Scan job lifecycle"),
        (name = "artifacts", description = "Scan result artifacts"),
        (name = "models", description = "Mounted model scanning"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Modelgate",
        description = "Security scanning and AI-SBOM generation for AI/ML model artifacts",
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);
    let max_upload = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/:id", get(get_job).delete(delete_job))
        .route("/api/jobs/:id/artifacts", get(list_artifacts))
        .route("/api/jobs/:id/download/:name", get(download_artifact))
        .route("/api/models", get(list_mounted_models))
        .route("/api/models/scan", post(scan_mounted_model))
        .route("/api/openapi.json", get(openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive()),
        )
        .layer(DefaultBodyLimit::max(max_upload as usize))
        .with_state(state)
}

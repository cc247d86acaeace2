//! Application setup and wiring

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use modelgate_core::infrastructure::archive::ExtractionLimits;
use modelgate_core::Config;
use modelgate_engines::engines_from_config;
use modelgate_orchestrator::application::pipeline::ScanPipeline;
use modelgate_orchestrator::application::use_cases::CreateScanJobUseCase;
use modelgate_orchestrator::application::workflow::JobWorkflow;
use modelgate_orchestrator::infrastructure::retention::spawn_retention_sweep;
use modelgate_orchestrator::infrastructure::worker::{
    job_queue, spawn_job_worker_pool, JobWorkerContext,
};
use modelgate_orchestrator::infrastructure::{FileBackedJobStore, JobStore};
use modelgate_orchestrator::presentation::controllers::AppState;
use modelgate_orchestrator::presentation::routes::create_router;

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
}

/// Build the application: storage, job store, engines, workers, router.
pub fn create_app(config: Config) -> std::io::Result<AppHandle> {
    config.storage.ensure_directories()?;

    let shutdown_token = CancellationToken::new();
    let job_store: Arc<dyn JobStore> =
        FileBackedJobStore::load_existing(config.storage.results_dir());

    let engines = engines_from_config(&config.engines);
    tracing::info!(engines = engines.len(), "Scan engines configured");

    let pipeline = Arc::new(ScanPipeline::new(
        engines,
        ExtractionLimits::from(&config.extraction),
    ));
    let workflow = JobWorkflow::new(job_store.clone());

    let (queue, queue_rx) = job_queue();
    spawn_job_worker_pool(
        JobWorkerContext {
            job_store: job_store.clone(),
            workflow,
            pipeline,
            uploads_root: config.storage.uploads_dir(),
            results_root: config.storage.results_dir(),
        },
        queue_rx,
        config.jobs.max_concurrent,
        shutdown_token.clone(),
    );

    spawn_retention_sweep(
        job_store.clone(),
        config.storage.uploads_dir(),
        config.jobs.retention_window(),
        config.jobs.sweep_interval(),
        shutdown_token.clone(),
    );

    let create_jobs = Arc::new(CreateScanJobUseCase::new(
        job_store.clone(),
        queue,
        config.storage.uploads_dir(),
        config.models.clone(),
    ));

    let state = AppState {
        job_store,
        create_jobs,
        config: Arc::new(config),
    };

    Ok(AppHandle {
        router: create_router(state),
        shutdown_token,
    })
}

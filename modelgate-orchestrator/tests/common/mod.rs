//! Shared test fixtures: stub engines and a fully wired application.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use modelgate_core::domain::engine::{EngineError, ScanEngine};
use modelgate_core::domain::finding::{EngineKind, EngineResult, Finding, Severity};
use modelgate_core::domain::format::ModelKind;
use modelgate_core::infrastructure::archive::ExtractionLimits;
use modelgate_core::Config;

use modelgate_orchestrator::application::pipeline::ScanPipeline;
use modelgate_orchestrator::application::use_cases::CreateScanJobUseCase;
use modelgate_orchestrator::application::workflow::JobWorkflow;
use modelgate_orchestrator::domain::entities::ScanJob;
use modelgate_orchestrator::infrastructure::worker::{
    job_queue, spawn_job_worker_pool, JobQueueHandle, JobWorkerContext,
};
use modelgate_orchestrator::infrastructure::{FileBackedJobStore, JobStore};
use modelgate_orchestrator::presentation::controllers::AppState;

/// Content marker the dangerous stub engine looks for.
pub const DANGEROUS_MARKER: &[u8] = b"__dangerous_payload__";

/// Configurable in-process engine double.
pub struct StubEngine {
    pub kind: EngineKind,
    pub pickle_only: bool,
    pub delay: Option<Duration>,
    pub always_fail: bool,
    pub concurrent: Arc<AtomicUsize>,
    pub peak_concurrent: Arc<AtomicUsize>,
}

impl StubEngine {
    pub fn structural() -> Self {
        Self::new(EngineKind::Modelscan, false)
    }

    pub fn deserialization() -> Self {
        Self::new(EngineKind::Picklescan, true)
    }

    fn new(kind: EngineKind, pickle_only: bool) -> Self {
        Self {
            kind,
            pickle_only,
            delay: None,
            always_fail: false,
            concurrent: Arc::new(AtomicUsize::new(0)),
            peak_concurrent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.always_fail = true;
        self
    }
}

#[async_trait]
impl ScanEngine for StubEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn supports(&self, kind: ModelKind) -> bool {
        !self.pickle_only || kind.is_pickle_based()
    }

    async fn scan(
        &self,
        target: &std::path::Path,
        workdir: &std::path::Path,
    ) -> Result<EngineResult, EngineError> {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrent.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = (|| {
            if self.always_fail {
                return Err(EngineError::Crashed {
                    engine: self.kind,
                    exit_code: 2,
                    stderr: "stub crash".to_string(),
                });
            }

            let content = std::fs::read(target).map_err(|source| EngineError::Launch {
                engine: self.kind,
                source,
            })?;
            let relative = target
                .strip_prefix(workdir)
                .unwrap_or(target)
                .to_string_lossy()
                .into_owned();

            let findings = if content
                .windows(DANGEROUS_MARKER.len())
                .any(|w| w == DANGEROUS_MARKER)
            {
                vec![Finding {
                    engine: self.kind,
                    severity: Severity::High,
                    category: "dangerous-global".to_string(),
                    unsafe_deserialization: self.kind == EngineKind::Picklescan,
                    message: "Dangerous global 'system' found in module 'os'".to_string(),
                    path: relative,
                    raw: serde_json::json!({"global": "system", "module": "os"}),
                }]
            } else {
                Vec::new()
            };

            Ok(EngineResult {
                engine: self.kind,
                version: "0.0.0-stub".to_string(),
                exit_code: i32::from(!findings.is_empty()),
                findings,
                raw_output: serde_json::json!({"stub": true}),
                error: None,
            })
        })();

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A wired application over temp storage with injected engines.
pub struct TestApp {
    pub state: AppState,
    pub job_store: Arc<dyn JobStore>,
    pub create_jobs: Arc<CreateScanJobUseCase>,
    pub queue: JobQueueHandle,
    pub uploads_root: PathBuf,
    pub results_root: PathBuf,
    pub shutdown: CancellationToken,
    _data_dir: tempfile::TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn spawn_test_app(
    engines: Vec<Arc<dyn ScanEngine>>,
    max_concurrent: usize,
    mounted_root: Option<PathBuf>,
) -> TestApp {
    let data_dir = tempfile::tempdir().expect("temp data dir");

    let mut config = Config::default();
    config.storage.data_dir = data_dir.path().to_path_buf();
    config.jobs.max_concurrent = max_concurrent;
    config.models.root = mounted_root;
    // Small ceilings keep decompression-bomb tests fast.
    config.extraction.max_entries = 64;
    config.extraction.max_entry_bytes = 256 * 1024;
    config.extraction.max_total_bytes = 1024 * 1024;
    config.storage.ensure_directories().expect("storage dirs");

    let uploads_root = config.storage.uploads_dir();
    let results_root = config.storage.results_dir();

    let job_store: Arc<dyn JobStore> = Arc::new(FileBackedJobStore::new(results_root.clone()));
    let workflow = JobWorkflow::new(job_store.clone());
    let pipeline = Arc::new(ScanPipeline::new(
        engines,
        ExtractionLimits::from(&config.extraction),
    ));

    let shutdown = CancellationToken::new();
    let (queue, queue_rx) = job_queue();
    spawn_job_worker_pool(
        JobWorkerContext {
            job_store: job_store.clone(),
            workflow,
            pipeline,
            uploads_root: uploads_root.clone(),
            results_root: results_root.clone(),
        },
        queue_rx,
        max_concurrent,
        shutdown.clone(),
    );

    let create_jobs = Arc::new(CreateScanJobUseCase::new(
        job_store.clone(),
        queue.clone(),
        uploads_root.clone(),
        config.models.clone(),
    ));

    let state = AppState {
        job_store: job_store.clone(),
        create_jobs: create_jobs.clone(),
        config: Arc::new(config),
    };

    TestApp {
        state,
        job_store,
        create_jobs,
        queue,
        uploads_root,
        results_root,
        shutdown,
        _data_dir: data_dir,
    }
}

/// Stage a file the way the upload handler would, then create the job.
pub async fn submit_upload(
    app: &TestApp,
    filename: &str,
    content: &[u8],
    options: modelgate_orchestrator::domain::value_objects::JobOptions,
) -> Uuid {
    let staged = app.uploads_root.join(format!(".staging-{}", Uuid::new_v4()));
    std::fs::write(&staged, content).expect("stage upload");
    app.create_jobs
        .create_upload_job(staged, filename, options)
        .await
        .expect("create job")
}

/// Poll until the job reaches a terminal state.
pub async fn wait_terminal(app: &TestApp, job_id: Uuid) -> ScanJob {
    for _ in 0..500 {
        if let Some(job) = app.job_store.get(job_id).await.expect("store get") {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

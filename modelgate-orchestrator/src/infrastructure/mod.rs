//! Orchestrator infrastructure

pub mod artifacts;
pub mod job_store;
pub mod mounted;
pub mod retention;
pub mod worker;

pub use job_store::{FileBackedJobStore, JobStore, JobStoreError};
pub use worker::{spawn_job_worker_pool, JobQueueHandle, JobWorkerContext};

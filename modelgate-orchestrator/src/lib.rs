//! Modelgate orchestrator - scan job coordination and HTTP API
//!
//! This crate owns the job lifecycle: it accepts scan requests, enforces the
//! global concurrency bound, runs the scan pipeline (detect, extract, scan,
//! evaluate, generate SBOM, persist), and exposes job state over HTTP.
//!
//! # Architecture
//!
//! ```text
//! modelgate-orchestrator/
//! ├── presentation/     # HTTP layer (axum controllers, DTOs, routes)
//! ├── application/      # Pipeline, workflow, policy, SBOM, use cases
//! ├── infrastructure/   # Job store, worker pool, artifacts, retention
//! └── domain/           # Job entities and the status state machine
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

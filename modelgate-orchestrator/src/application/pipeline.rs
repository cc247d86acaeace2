//! Scan pipeline
//!
//! Executes the ordered stages for one job: detect, extract, scan each model
//! file with each enabled engine, evaluate policy, generate the SBOM, and
//! publish artifacts. Each stage returns a typed result so the worker can
//! apply the skip-vs-abort policy centrally: a single engine failure is
//! absorbed as a warning (and escalated only by strict policy), while
//! extraction violations and persistence failures abort the job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use modelgate_core::domain::engine::ScanEngine;
use modelgate_core::domain::finding::{EngineKind, Finding};
use modelgate_core::domain::format::{self, FileClass, ModelKind};
use modelgate_core::domain::verdict::{PassFail, Verdict};
use modelgate_core::infrastructure::archive::{extract, ArchiveError, ExtractionLimits};
use modelgate_core::infrastructure::hashing::sha256_file;

use crate::application::{policy, sbom};
use crate::domain::entities::ScanJob;
use crate::infrastructure::artifacts;

/// Input rejections: the artifact itself is unusable.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Unsupported file format: {name}")]
    UnsupportedFormat { name: String },

    #[error("No model files found in input")]
    NoModelFiles,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Fatal pipeline failures. Recoverable engine failures never surface here;
/// they are absorbed into job warnings.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input rejected: {0}")]
    Input(#[from] InputError),

    #[error("All engine invocations failed: {0}")]
    EnginesUnusable(String),

    #[error("I/O failure during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stage label recorded in the job's error detail.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Input(InputError::Archive(_)) => "extract",
            Self::Input(_) => "detect",
            Self::EnginesUnusable(_) => "scan",
            Self::Io { stage, .. } => stage,
            Self::Internal(_) => "internal",
        }
    }
}

/// The per-job scan pipeline, shared by all workers.
pub struct ScanPipeline {
    engines: Vec<Arc<dyn ScanEngine>>,
    limits: ExtractionLimits,
}

impl ScanPipeline {
    pub fn new(engines: Vec<Arc<dyn ScanEngine>>, limits: ExtractionLimits) -> Self {
        Self { engines, limits }
    }

    /// Run every stage for `job`, returning the verdict.
    ///
    /// Mutates only the summary fields of `job` (warnings, engines, verdict
    /// fold); status transitions stay with the workflow layer.
    pub async fn execute(
        &self,
        job: &mut ScanJob,
        upload_dir: &Path,
        results_dir: &Path,
    ) -> Result<Verdict, PipelineError> {
        let model_files = self.discover(job, upload_dir).await?;
        info!(job_id = %job.job_id, files = model_files.len(), "Input classified");

        let (findings, engine_failures) = self
            .scan_files(job, &model_files, upload_dir, results_dir)
            .await?;

        let verdict = policy::apply_engine_failures(
            policy::evaluate(&findings, job.options.strict_policy),
            &engine_failures,
            job.options.strict_policy,
        );
        job.apply_verdict(&verdict, &findings);

        if verdict.pass_fail == PassFail::Pass || job.options.run_sbom_on_fail {
            self.generate_sbom(job, &model_files, &findings, upload_dir, results_dir)
                .await?;
        }

        Ok(verdict)
    }

    /// Detect the input class and extract archives into the scan root.
    async fn discover(
        &self,
        job: &mut ScanJob,
        upload_dir: &Path,
    ) -> Result<Vec<(PathBuf, ModelKind)>, PipelineError> {
        let mut inputs: Vec<PathBuf> = std::fs::read_dir(upload_dir)
            .map_err(|source| PipelineError::Io {
                stage: "detect",
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        inputs.sort();
        let single_input = inputs.len() == 1;

        let mut files = Vec::new();
        let mut archive_index = 0usize;

        for path in inputs {
            let header = read_header(&path).map_err(|source| PipelineError::Io {
                stage: "detect",
                source,
            })?;
            let display_name = file_name(&path);

            match format::classify(&path, &header) {
                FileClass::Model(kind) => files.push((path, kind)),
                FileClass::Archive(kind) => {
                    let dest = upload_dir.join(format!("extracted_{archive_index}"));
                    archive_index += 1;
                    let limits = self.limits;
                    let archive_path = path.clone();
                    let extracted = tokio::task::spawn_blocking(move || {
                        extract(&archive_path, kind, &dest, &limits)
                    })
                    .await
                    .map_err(|e| PipelineError::Internal(e.to_string()))?
                    .map_err(InputError::Archive)?;

                    let mut found_model = false;
                    for extracted_path in extracted {
                        let name = file_name(&extracted_path);
                        if let Some(kind) = format::model_kind_from_name(&name) {
                            files.push((extracted_path, kind));
                            found_model = true;
                        }
                    }
                    if !found_model {
                        job.warnings
                            .push(format!("archive '{display_name}' contained no model files"));
                    }
                }
                FileClass::Unsupported => {
                    if single_input {
                        return Err(InputError::UnsupportedFormat { name: display_name }.into());
                    }
                    job.warnings
                        .push(format!("'{display_name}' is not a supported model format"));
                }
            }
        }

        if files.is_empty() {
            return Err(InputError::NoModelFiles.into());
        }
        Ok(files)
    }

    /// Run every enabled engine over every model file.
    ///
    /// Engine failures are isolated per file: siblings still get scanned and
    /// the failure is recorded for policy escalation. Only the case where no
    /// invocation completed at all is fatal.
    async fn scan_files(
        &self,
        job: &mut ScanJob,
        model_files: &[(PathBuf, ModelKind)],
        upload_dir: &Path,
        results_dir: &Path,
    ) -> Result<(Vec<Finding>, Vec<String>), PipelineError> {
        let mut findings = Vec::new();
        let mut engine_failures = Vec::new();
        let mut attempted = 0usize;
        let mut completed = 0usize;
        let multi_file = model_files.len() > 1;

        for (index, (path, kind)) in model_files.iter().enumerate() {
            let relative = relative_to(path, upload_dir);

            for engine in &self.engines {
                if engine.kind() == EngineKind::Picklescan && !job.options.enable_picklescan {
                    continue;
                }
                if !engine.supports(*kind) {
                    job.warnings.push(format!(
                        "{} skipped for '{}' ({} format)",
                        engine.kind(),
                        relative,
                        kind.framework()
                    ));
                    continue;
                }

                attempted += 1;
                match engine.scan(path, upload_dir).await {
                    Ok(result) => {
                        completed += 1;
                        job.record_engine(engine.kind().as_str(), &result.version);

                        let artifact = if multi_file {
                            format!("{}_{index}.json", engine.kind())
                        } else {
                            format!("{}.json", engine.kind())
                        };
                        artifacts::publish_json(results_dir, &artifact, &result.raw_output)
                            .map_err(|source| PipelineError::Io {
                                stage: "persist",
                                source,
                            })?;

                        findings.extend(result.findings);
                    }
                    Err(e) => {
                        warn!(job_id = %job.job_id, engine = %engine.kind(), error = %e, "Engine invocation failed");
                        let detail = format!("'{relative}': {e}");
                        job.warnings.push(detail.clone());
                        engine_failures.push(detail);
                    }
                }
            }
        }

        if attempted > 0 && completed == 0 {
            return Err(PipelineError::EnginesUnusable(engine_failures.join("; ")));
        }
        Ok((findings, engine_failures))
    }

    async fn generate_sbom(
        &self,
        job: &mut ScanJob,
        model_files: &[(PathBuf, ModelKind)],
        findings: &[Finding],
        upload_dir: &Path,
        results_dir: &Path,
    ) -> Result<(), PipelineError> {
        let mut scanned = Vec::with_capacity(model_files.len());
        for (path, kind) in model_files {
            let relative = relative_to(path, upload_dir);
            let owned_path = path.clone();
            let kind = *kind;

            let (sha256, size, metadata) = tokio::task::spawn_blocking(move || {
                let sha256 = sha256_file(&owned_path)?;
                let size = std::fs::metadata(&owned_path)?.len();
                let metadata = sbom::inspect_metadata(&owned_path, kind);
                Ok::<_, std::io::Error>((sha256, size, metadata))
            })
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?
            .map_err(|source| PipelineError::Io {
                stage: "sbom",
                source,
            })?;

            if let Some(license) = &metadata.license {
                if sbom::is_restrictive_license(license) {
                    job.warnings.push(format!(
                        "restrictive license '{license}' declared by '{relative}'"
                    ));
                }
            }

            scanned.push(sbom::ScannedFile {
                relative_path: relative,
                kind: Some(kind),
                sha256,
                size,
                metadata,
            });
        }

        let document = sbom::generate(&job.filename, &scanned, findings, Utc::now());
        artifacts::publish_json(results_dir, artifacts::SBOM_ARTIFACT, &document).map_err(
            |source| PipelineError::Io {
                stage: "persist",
                source,
            },
        )?;
        job.record_engine("aisbom", sbom::SBOM_GENERATOR_VERSION);
        Ok(())
    }
}

fn relative_to(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut header = vec![0u8; 512];
    let mut filled = 0usize;
    while filled < header.len() {
        let read = file.read(&mut header[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    header.truncate(filled);
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_inside_the_scan_root() {
        let root = Path::new("/data/uploads/job");
        assert_eq!(
            relative_to(Path::new("/data/uploads/job/extracted_0/m.pkl"), root),
            "extracted_0/m.pkl"
        );
        assert_eq!(relative_to(Path::new("/elsewhere/m.pkl"), root), "/elsewhere/m.pkl");
    }

    #[test]
    fn stage_labels_follow_the_error_taxonomy() {
        let unsupported: PipelineError = InputError::UnsupportedFormat {
            name: "x.txt".into(),
        }
        .into();
        assert_eq!(unsupported.stage(), "detect");

        let archive: PipelineError =
            InputError::Archive(ArchiveError::TotalTooLarge { limit: 1 }).into();
        assert_eq!(archive.stage(), "extract");

        assert_eq!(PipelineError::EnginesUnusable(String::new()).stage(), "scan");
    }
}

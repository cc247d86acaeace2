//! Artifact persistence
//!
//! Artifacts are published atomically: written to a staging name in the same
//! directory, then renamed into place, so a concurrent reader never observes
//! a partially written file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const SUMMARY_ARTIFACT: &str = "summary.json";
pub const SBOM_ARTIFACT: &str = "aisbom.json";
pub const BUNDLE_ARTIFACT: &str = "artifacts.zip";

const STAGING_PREFIX: &str = ".staging-";

/// Upload directory for a job's input files.
pub fn job_upload_dir(uploads_root: &Path, job_id: Uuid) -> PathBuf {
    uploads_root.join(job_id.to_string())
}

/// Results directory holding a job's artifact set.
pub fn job_results_dir(results_root: &Path, job_id: Uuid) -> PathBuf {
    results_root.join(job_id.to_string())
}

/// Write a JSON artifact atomically and return its final path.
pub fn publish_json(
    dir: &Path,
    name: &str,
    value: &serde_json::Value,
) -> std::io::Result<PathBuf> {
    let staging = dir.join(format!("{STAGING_PREFIX}{name}"));
    let target = dir.join(name);

    let mut file = File::create(&staging)?;
    serde_json::to_writer_pretty(&mut file, value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&staging, &target)?;
    Ok(target)
}

/// Bundle every JSON artifact in the results directory into `artifacts.zip`.
pub fn bundle(results_dir: &Path) -> std::io::Result<PathBuf> {
    let staging = results_dir.join(format!("{STAGING_PREFIX}{BUNDLE_ARTIFACT}"));
    let target = results_dir.join(BUNDLE_ARTIFACT);

    let file = File::create(&staging)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut names: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(results_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_file() && name.ends_with(".json") && !name.starts_with(STAGING_PREFIX) {
            names.push((name, path));
        }
    }
    names.sort();

    for (name, path) in names {
        writer
            .start_file(name, options)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut source = File::open(&path)?;
        std::io::copy(&mut source, &mut writer)?;
    }
    writer
        .finish()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    std::fs::rename(&staging, &target)?;
    Ok(target)
}

/// Resolve an artifact by name, refusing anything that is not a plain
/// filename inside the results directory.
pub fn artifact_path(results_dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with(STAGING_PREFIX)
    {
        return None;
    }
    let path = results_dir.join(name);
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// List published artifacts as `(name, size)` pairs, sorted by name.
pub fn list(results_dir: &Path) -> std::io::Result<Vec<(String, u64)>> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(results_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(STAGING_PREFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            artifacts.push((name, metadata.len()));
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Remove partially produced artifacts after a pipeline failure, keeping
/// only the summary record.
pub fn clean_partial(results_dir: &Path) -> std::io::Result<()> {
    if !results_dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(results_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != SUMMARY_ARTIFACT {
            let _ = std::fs::remove_file(entry.path());
        }
    }
    Ok(())
}

/// Content type for artifact downloads.
pub fn content_type(name: &str) -> &'static str {
    if name.ends_with(".json") {
        "application/json"
    } else if name.ends_with(".zip") {
        "application/zip"
    } else if name.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

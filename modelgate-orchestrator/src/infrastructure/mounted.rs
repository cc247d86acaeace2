//! Mounted model directory
//!
//! Listing and traversal-safe resolution of model files under the read-only
//! mounted root. Resolution uses the same defense as archive extraction:
//! relative paths only, no parent components, and a canonical prefix check.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use utoipa::ToSchema;
use walkdir::WalkDir;

use modelgate_core::domain::format;

/// Default listing depth when the config does not set one.
const DEFAULT_MAX_DEPTH: usize = 5;

/// A model file visible under the mounted root.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MountedModel {
    /// Path relative to the mounted root
    pub path: String,
    pub size: u64,
    /// Framework label derived from the extension
    pub format: String,
}

/// Errors from mounted path resolution.
#[derive(Debug, thiserror::Error)]
pub enum MountedPathError {
    #[error("Path escapes the mounted model root")]
    Traversal,

    #[error("Mounted path not found: {0}")]
    NotFound(String),
}

/// List every supported model file under the mounted root.
pub fn list_models(root: &Path, max_depth: Option<usize>) -> Vec<MountedModel> {
    let mut models = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
        .follow_links(false);

    for entry in walker.into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(kind) = format::model_kind_from_name(&name) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        models.push(MountedModel {
            path: relative.to_string_lossy().into_owned(),
            size,
            format: kind.framework().to_string(),
        });
    }

    models.sort_by(|a, b| a.path.cmp(&b.path));
    models
}

/// Resolve a relative path strictly inside the mounted root.
///
/// The result may be a model file or a directory of model files; anything
/// absolute, empty, or containing parent components is rejected before the
/// filesystem is consulted.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, MountedPathError> {
    let candidate = Path::new(relative);
    if relative.is_empty() || candidate.is_absolute() {
        return Err(MountedPathError::Traversal);
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MountedPathError::Traversal);
            }
        }
    }

    let joined = root.join(candidate);
    let canonical = joined
        .canonicalize()
        .map_err(|_| MountedPathError::NotFound(relative.to_string()))?;
    let canonical_root = root
        .canonicalize()
        .map_err(|_| MountedPathError::NotFound(relative.to_string()))?;
    if !canonical.starts_with(&canonical_root) {
        return Err(MountedPathError::Traversal);
    }
    Ok(canonical)
}

/// Collect model files from a resolved mounted path (file or directory).
pub fn collect_model_files(resolved: &Path, max_depth: Option<usize>) -> Vec<PathBuf> {
    if resolved.is_file() {
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return if format::is_supported_model(&name) {
            vec![resolved.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(resolved)
        .max_depth(max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
        .follow_links(false)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter(|e| format::is_supported_model(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mounted_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("llama")).unwrap();
        fs::write(dir.path().join("llama/weights.safetensors"), b"st").unwrap();
        fs::write(dir.path().join("llama/weights.pkl"), b"pk").unwrap();
        fs::write(dir.path().join("readme.md"), b"doc").unwrap();
        dir
    }

    #[test]
    fn listing_includes_only_supported_models() {
        let root = mounted_root();
        let models = list_models(root.path(), None);
        let paths: Vec<&str> = models.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["llama/weights.pkl", "llama/weights.safetensors"]);
    }

    #[test]
    fn resolve_accepts_nested_relative_paths() {
        let root = mounted_root();
        let resolved = resolve(root.path(), "llama/weights.pkl").unwrap();
        assert!(resolved.ends_with("llama/weights.pkl"));
    }

    #[test]
    fn resolve_rejects_traversal_and_absolute_paths() {
        let root = mounted_root();
        assert!(matches!(
            resolve(root.path(), "../etc/passwd"),
            Err(MountedPathError::Traversal)
        ));
        assert!(matches!(
            resolve(root.path(), "/etc/passwd"),
            Err(MountedPathError::Traversal)
        ));
        assert!(matches!(
            resolve(root.path(), "llama/../../escape"),
            Err(MountedPathError::Traversal)
        ));
        assert!(matches!(
            resolve(root.path(), ""),
            Err(MountedPathError::Traversal)
        ));
    }

    #[test]
    fn resolve_rejects_symlink_escapes() {
        let root = mounted_root();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.pkl"), b"outside").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
            assert!(matches!(
                resolve(root.path(), "link/secret.pkl"),
                Err(MountedPathError::Traversal)
            ));
        }
    }

    #[test]
    fn directory_resolution_collects_model_files() {
        let root = mounted_root();
        let resolved = resolve(root.path(), "llama").unwrap();
        let files = collect_model_files(&resolved, None);
        assert_eq!(files.len(), 2);
    }
}

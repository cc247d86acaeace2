//! Safe extraction of untrusted archives
//!
//! Extraction is fail-closed at the whole-archive level: any violated entry
//! aborts the extraction and the destination directory is removed. A
//! partially-extracted, partially-trusted tree is a worse posture than no
//! extraction.
//!
//! Hard failures:
//! - entry paths escaping the destination root (`..` or absolute)
//! - symlink and hardlink entries
//! - per-entry and cumulative decompressed-size ceilings
//! - declared compression ratio above the ceiling (ZIP)
//! - entry count above the ceiling

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::domain::format::ArchiveKind;

/// Ceilings applied to a single extraction
#[derive(Debug, Clone, Copy)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
    pub max_compression_ratio: u64,
}

impl From<&ExtractionConfig> for ExtractionLimits {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_entry_bytes: config.max_entry_bytes,
            max_total_bytes: config.max_total_bytes,
            max_compression_ratio: config.max_compression_ratio,
        }
    }
}

/// Errors from archive extraction
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("Archive entry '{entry}' escapes the destination root")]
    PathTraversal { entry: String },

    #[error("Archive entry '{entry}' is a link; link entries are not extracted")]
    LinkEntry { entry: String },

    #[error("Archive entry '{entry}' is {size} bytes, per-entry limit is {limit}")]
    EntryTooLarge { entry: String, size: u64, limit: u64 },

    #[error("Archive decompresses to more than {limit} bytes")]
    TotalTooLarge { limit: u64 },

    #[error("Archive entry '{entry}' exceeds the compression ratio limit")]
    RatioExceeded { entry: String },

    #[error("Malformed archive: {0}")]
    Malformed(String),

    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract `archive` into `dest_root`, returning the extracted regular files.
///
/// `dest_root` is created by this function and must not pre-exist with
/// content the caller wants to keep: on any violation it is removed
/// entirely before the error is returned.
pub fn extract(
    archive: &Path,
    kind: ArchiveKind,
    dest_root: &Path,
    limits: &ExtractionLimits,
) -> Result<Vec<PathBuf>, ArchiveError> {
    std::fs::create_dir_all(dest_root)?;

    let result = match kind {
        ArchiveKind::Zip => extract_zip(archive, dest_root, limits),
        ArchiveKind::Tar => {
            let file = File::open(archive)?;
            extract_tar(tar::Archive::new(file), dest_root, limits)
        }
        ArchiveKind::TarGz => {
            let file = File::open(archive)?;
            extract_tar(tar::Archive::new(GzDecoder::new(file)), dest_root, limits)
        }
    };

    if result.is_err() {
        // Fail-closed: leave nothing behind.
        let _ = std::fs::remove_dir_all(dest_root);
    }
    result
}

fn extract_zip(
    archive_path: &Path,
    dest_root: &Path,
    limits: &ExtractionLimits,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ArchiveError::Malformed(e.to_string()))?;

    let entry_count = archive.len();
    if entry_count > limits.max_entries {
        return Err(ArchiveError::TooManyEntries {
            count: entry_count,
            limit: limits.max_entries,
        });
    }

    let mut extracted = Vec::new();
    let mut total: u64 = 0;

    for i in 0..entry_count {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        let entry_name = entry.name().to_string();

        if is_link_mode(entry.unix_mode()) {
            return Err(ArchiveError::LinkEntry { entry: entry_name });
        }

        let declared = entry.size();
        if declared > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                entry: entry_name,
                size: declared,
                limit: limits.max_entry_bytes,
            });
        }
        if declared > 0 {
            let compressed = entry.compressed_size();
            if compressed == 0 {
                return Err(ArchiveError::Malformed(format!(
                    "entry '{entry_name}' has zero compressed size"
                )));
            }
            if declared > compressed.saturating_mul(limits.max_compression_ratio) {
                return Err(ArchiveError::RatioExceeded { entry: entry_name });
            }
        }

        // enclosed_name rejects `..` components and absolute paths.
        let relative = entry
            .enclosed_name()
            .ok_or(ArchiveError::PathTraversal { entry: entry_name.clone() })?;
        let outpath = dest_root.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // The declared size is untrusted; count what actually inflates.
        let budget = remaining_budget(total, limits)?.min(limits.max_entry_bytes);
        let mut outfile = File::create(&outpath)?;
        let copied = std::io::copy(&mut (&mut entry).take(budget + 1), &mut outfile)?;
        if copied > budget {
            return Err(over_budget(entry_name, copied, limits));
        }
        total += copied;

        debug!(entry = %entry_name, bytes = copied, "Extracted zip entry");
        extracted.push(outpath);
    }

    Ok(extracted)
}

fn extract_tar<R: Read>(
    mut archive: tar::Archive<R>,
    dest_root: &Path,
    limits: &ExtractionLimits,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut extracted = Vec::new();
    let mut total: u64 = 0;
    let mut entry_count: usize = 0;

    for entry in archive
        .entries()
        .map_err(|e| ArchiveError::Malformed(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| ArchiveError::Malformed(e.to_string()))?;

        entry_count += 1;
        if entry_count > limits.max_entries {
            return Err(ArchiveError::TooManyEntries {
                count: entry_count,
                limit: limits.max_entries,
            });
        }

        let entry_name = entry
            .path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("<entry {entry_count}>"));

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(ArchiveError::LinkEntry { entry: entry_name });
        }
        if entry_type.is_dir() {
            let relative = safe_relative_path(&entry, &entry_name)?;
            std::fs::create_dir_all(dest_root.join(relative))?;
            continue;
        }
        if !entry_type.is_file() {
            // Pax/extended headers and special files carry no payload we scan.
            continue;
        }

        let declared = entry
            .header()
            .size()
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        if declared > limits.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                entry: entry_name,
                size: declared,
                limit: limits.max_entry_bytes,
            });
        }

        let relative = safe_relative_path(&entry, &entry_name)?;
        let outpath = dest_root.join(relative);
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let budget = remaining_budget(total, limits)?.min(limits.max_entry_bytes);
        let mut outfile = File::create(&outpath)?;
        let copied = std::io::copy(&mut (&mut entry).take(budget + 1), &mut outfile)?;
        if copied > budget {
            return Err(over_budget(entry_name, copied, limits));
        }
        total += copied;

        debug!(entry = %entry_name, bytes = copied, "Extracted tar entry");
        extracted.push(outpath);
    }

    Ok(extracted)
}

/// Validate a tar entry path: relative, no `..`, no root component.
fn safe_relative_path<R: Read>(
    entry: &tar::Entry<'_, R>,
    entry_name: &str,
) -> Result<PathBuf, ArchiveError> {
    let path = entry.path().map_err(|_| ArchiveError::PathTraversal {
        entry: entry_name.to_string(),
    })?;

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::PathTraversal {
                    entry: entry_name.to_string(),
                });
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(ArchiveError::PathTraversal {
            entry: entry_name.to_string(),
        });
    }
    Ok(clean)
}

fn is_link_mode(unix_mode: Option<u32>) -> bool {
    matches!(unix_mode, Some(mode) if mode & 0o170000 == 0o120000)
}

fn remaining_budget(total: u64, limits: &ExtractionLimits) -> Result<u64, ArchiveError> {
    if total >= limits.max_total_bytes {
        return Err(ArchiveError::TotalTooLarge {
            limit: limits.max_total_bytes,
        });
    }
    Ok(limits.max_total_bytes - total)
}

fn over_budget(entry: String, copied: u64, limits: &ExtractionLimits) -> ArchiveError {
    if copied > limits.max_entry_bytes {
        ArchiveError::EntryTooLarge {
            entry,
            size: copied,
            limit: limits.max_entry_bytes,
        }
    } else {
        ArchiveError::TotalTooLarge {
            limit: limits.max_total_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn small_limits() -> ExtractionLimits {
        ExtractionLimits {
            max_entries: 100,
            max_entry_bytes: 1024,
            max_total_bytes: 4096,
            max_compression_ratio: 200,
        }
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            // Write the entry name directly into the header's name field rather
            // than going through `append_data`/`set_path`, which rejects `..`
            // components. These tests deliberately construct traversal paths.
            let name_bytes = name.as_bytes();
            header.as_mut_bytes()[..name_bytes.len()].copy_from_slice(name_bytes);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap();
    }

    #[test]
    fn extracts_nested_zip_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[("a.pkl", b"one"), ("sub/b.safetensors", b"two")]);

        let dest = dir.path().join("out");
        let files = extract(&archive, ArchiveKind::Zip, &dest, &small_limits()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(dest.join("sub/b.safetensors").is_file());
    }

    #[test]
    fn zip_slip_entry_aborts_and_cleans_destination() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("ok.pkl", b"fine"), ("../../escape.pkl", b"bad")]);

        let dest = dir.path().join("out");
        let err = extract(&archive, ArchiveKind::Zip, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal { .. }));
        assert!(!dest.exists(), "destination must be removed on failure");
        assert!(!dir.path().join("escape.pkl").exists());
    }

    #[test]
    fn tar_parent_dir_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar");
        write_tar(&archive, &[("../outside.pkl", b"bad")]);

        let dest = dir.path().join("out");
        let err = extract(&archive, ArchiveKind::Tar, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn tar_symlink_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("links.tar");
        let file = File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(file);
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_link(&mut header, "link.pkl", "/etc/passwd")
            .unwrap();
        builder.into_inner().unwrap();

        let dest = dir.path().join("out");
        let err = extract(&archive, ArchiveKind::Tar, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::LinkEntry { .. }));
    }

    #[test]
    fn cumulative_ceiling_aborts_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("big.tar");
        let chunk = vec![0u8; 1024];
        write_tar(
            &archive,
            &[
                ("a.bin", chunk.as_slice()),
                ("b.bin", chunk.as_slice()),
                ("c.bin", chunk.as_slice()),
                ("d.bin", chunk.as_slice()),
                ("e.bin", chunk.as_slice()),
            ],
        );

        let dest = dir.path().join("out");
        let err = extract(&archive, ArchiveKind::Tar, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::TotalTooLarge { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn per_entry_ceiling_aborts_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("fat.tar");
        let fat = vec![0u8; 2048];
        write_tar(&archive, &[("fat.bin", fat.as_slice())]);

        let dest = dir.path().join("out");
        let err = extract(&archive, ArchiveKind::Tar, &dest, &small_limits()).unwrap_err();
        assert!(matches!(err, ArchiveError::EntryTooLarge { .. }));
    }

    #[test]
    fn tar_gz_roundtrip_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        let file = File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_ustar();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "m.pkl", &b"hello"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        let files = extract(&archive, ArchiveKind::TarGz, &dest, &small_limits()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"hello");
    }
}

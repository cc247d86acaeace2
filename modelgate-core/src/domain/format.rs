//! Model and archive format classification
//!
//! Extension matching is authoritative for model kinds: content sniffing is
//! not universally reliable for formats like SafeTensors or ONNX. Archive
//! kinds are corroborated by magic bytes so a mislabeled file is never
//! extracted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Recognized model serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Pickle,
    Pytorch,
    Joblib,
    Keras,
    Onnx,
    Safetensors,
    Gguf,
    Tensorflow,
    TfLite,
    CoreMl,
}

impl ModelKind {
    /// Framework label used in SBOM properties
    pub fn framework(&self) -> &'static str {
        match self {
            Self::Pickle => "pickle",
            Self::Pytorch => "pytorch",
            Self::Joblib => "scikit-learn",
            Self::Keras => "keras",
            Self::Onnx => "onnx",
            Self::Safetensors => "safetensors",
            Self::Gguf => "gguf",
            Self::Tensorflow => "tensorflow",
            Self::TfLite => "tensorflow-lite",
            Self::CoreMl => "coreml",
        }
    }

    /// Formats whose payload is (or embeds) a pickle stream; these are the
    /// only formats the deserialization scanner is meaningful for.
    pub fn is_pickle_based(&self) -> bool {
        matches!(self, Self::Pickle | Self::Pytorch | Self::Joblib)
    }
}

/// Recognized archive container kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

/// Classification of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Model(ModelKind),
    Archive(ArchiveKind),
    /// Terminal classification; the pipeline neither extracts nor scans these
    Unsupported,
}

/// All file extensions accepted as scan input (models and archives).
pub const SUPPORTED_MODEL_EXTENSIONS: &[&str] = &[
    ".pkl",
    ".pickle",
    ".pt",
    ".pth",
    ".bin",
    ".joblib",
    ".h5",
    ".hdf5",
    ".keras",
    ".onnx",
    ".safetensors",
    ".gguf",
    ".pb",
    ".tflite",
    ".mlmodel",
];

/// Lowercase extension including the leading dot, `.tar.gz`-aware.
pub fn file_extension(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") {
        return ".tar.gz".to_string();
    }
    match lower.rfind('.') {
        Some(idx) => lower[idx..].to_string(),
        None => String::new(),
    }
}

/// Map a filename to a model kind by extension.
pub fn model_kind_from_name(name: &str) -> Option<ModelKind> {
    match file_extension(name).as_str() {
        ".pkl" | ".pickle" => Some(ModelKind::Pickle),
        ".pt" | ".pth" | ".bin" => Some(ModelKind::Pytorch),
        ".joblib" => Some(ModelKind::Joblib),
        ".h5" | ".hdf5" | ".keras" => Some(ModelKind::Keras),
        ".onnx" => Some(ModelKind::Onnx),
        ".safetensors" => Some(ModelKind::Safetensors),
        ".gguf" => Some(ModelKind::Gguf),
        ".pb" => Some(ModelKind::Tensorflow),
        ".tflite" => Some(ModelKind::TfLite),
        ".mlmodel" => Some(ModelKind::CoreMl),
        _ => None,
    }
}

/// Map a filename to an archive kind by extension.
pub fn archive_kind_from_name(name: &str) -> Option<ArchiveKind> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Some(ArchiveKind::TarGz);
    }
    if lower.ends_with(".tar") {
        return Some(ArchiveKind::Tar);
    }
    if lower.ends_with(".zip") {
        return Some(ArchiveKind::Zip);
    }
    None
}

/// ZIP local-file-header signature.
pub fn is_zip_magic(header: &[u8]) -> bool {
    header.len() >= 4 && &header[..4] == b"PK\x03\x04"
}

/// gzip two-byte magic.
pub fn is_gzip_magic(header: &[u8]) -> bool {
    header.len() >= 2 && header[0] == 0x1f && header[1] == 0x8b
}

/// POSIX ustar magic at offset 257 of the first tar header block.
pub fn is_ustar_header(header: &[u8]) -> bool {
    header.len() >= 262 && &header[257..262] == b"ustar"
}

/// Whether the filename maps to a pickle-based format.
pub fn is_pickle_format(name: &str) -> bool {
    model_kind_from_name(name).is_some_and(|k| k.is_pickle_based())
}

/// Whether the filename carries a supported model extension.
pub fn is_supported_model(name: &str) -> bool {
    model_kind_from_name(name).is_some()
}

/// Classify an input file from its name and the first bytes of its content.
///
/// Model kinds are decided by extension alone. Archive kinds additionally
/// require the matching magic bytes; a `.zip` that does not start with the
/// ZIP signature is `Unsupported`, not an archive.
pub fn classify(path: &Path, header: &[u8]) -> FileClass {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return FileClass::Unsupported,
    };

    if let Some(kind) = archive_kind_from_name(name) {
        let corroborated = match kind {
            ArchiveKind::Zip => is_zip_magic(header),
            ArchiveKind::TarGz => is_gzip_magic(header),
            ArchiveKind::Tar => is_ustar_header(header),
        };
        return if corroborated {
            FileClass::Archive(kind)
        } else {
            FileClass::Unsupported
        };
    }

    match model_kind_from_name(name) {
        Some(kind) => FileClass::Model(kind),
        None => FileClass::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_table_covers_model_kinds() {
        assert_eq!(model_kind_from_name("model.safetensors"), Some(ModelKind::Safetensors));
        assert_eq!(model_kind_from_name("weights.PT"), Some(ModelKind::Pytorch));
        assert_eq!(model_kind_from_name("clf.joblib"), Some(ModelKind::Joblib));
        assert_eq!(model_kind_from_name("net.onnx"), Some(ModelKind::Onnx));
        assert_eq!(model_kind_from_name("readme.txt"), None);
    }

    #[test]
    fn tar_gz_extension_wins_over_plain_gz_suffix() {
        assert_eq!(archive_kind_from_name("bundle.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(archive_kind_from_name("bundle.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(archive_kind_from_name("bundle.tar"), Some(ArchiveKind::Tar));
    }

    #[test]
    fn pickle_predicate_matches_pickle_backed_formats() {
        assert!(is_pickle_format("model.pkl"));
        assert!(is_pickle_format("model.pth"));
        assert!(is_pickle_format("model.bin"));
        assert!(!is_pickle_format("model.safetensors"));
        assert!(!is_pickle_format("model.gguf"));
    }

    #[test]
    fn archive_classification_requires_magic_corroboration() {
        let path = PathBuf::from("payload.zip");
        assert_eq!(
            classify(&path, b"PK\x03\x04rest"),
            FileClass::Archive(ArchiveKind::Zip)
        );
        // Mislabeled: zip extension, gzip content.
        assert_eq!(classify(&path, &[0x1f, 0x8b, 0x08]), FileClass::Unsupported);
    }

    #[test]
    fn model_classification_is_extension_authoritative() {
        let path = PathBuf::from("model.safetensors");
        assert_eq!(
            classify(&path, b"arbitrary bytes"),
            FileClass::Model(ModelKind::Safetensors)
        );
    }

    #[test]
    fn ustar_magic_needs_a_full_header_block() {
        let mut header = vec![0u8; 512];
        header[257..262].copy_from_slice(b"ustar");
        assert!(is_ustar_header(&header));
        assert!(!is_ustar_header(&header[..200]));
    }
}

//! AI-SBOM generation
//!
//! Builds a CycloneDX 1.6 document describing the scanned model files and the
//! normalized findings against them. Generation is deterministic: identical
//! inputs produce identical output except the metadata timestamp; the serial
//! number is derived from the primary file's content hash.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use modelgate_core::domain::finding::{Finding, Severity};
use modelgate_core::domain::format::ModelKind;

/// Version stamp of the built-in SBOM generator
pub const SBOM_GENERATOR_VERSION: &str = "1.0.0";

/// Largest safetensors header the inspector will read
const MAX_SAFETENSORS_HEADER: u64 = 100 * 1024 * 1024;

/// Header metadata recovered from a model file without loading it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    pub declared_format: Option<String>,
    pub tensor_count: Option<usize>,
    pub license: Option<String>,
    pub gguf_version: Option<u32>,
}

/// One scanned model file as it appears in the SBOM
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the scan root
    pub relative_path: String,
    pub kind: Option<ModelKind>,
    pub sha256: String,
    pub size: u64,
    pub metadata: ModelMetadata,
}

fn severity_rating(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}

fn bom_ref(index: usize) -> String {
    format!("model-{index}")
}

fn component_for(file: &ScannedFile, index: usize) -> Value {
    let name = file
        .relative_path
        .rsplit('/')
        .next()
        .unwrap_or(file.relative_path.as_str());
    let format = file
        .kind
        .map(|k| k.framework())
        .unwrap_or("unknown");

    let mut properties = vec![
        json!({"name": "model:format", "value": format}),
        json!({"name": "model:path", "value": file.relative_path}),
        json!({"name": "model:file_size", "value": file.size.to_string()}),
    ];
    if let Some(declared) = &file.metadata.declared_format {
        properties.push(json!({"name": "model:declared_format", "value": declared}));
    }
    if let Some(count) = file.metadata.tensor_count {
        properties.push(json!({"name": "model:tensor_count", "value": count.to_string()}));
    }
    if let Some(license) = &file.metadata.license {
        properties.push(json!({"name": "model:license", "value": license}));
    }
    if let Some(version) = file.metadata.gguf_version {
        properties.push(json!({"name": "model:gguf_version", "value": version.to_string()}));
    }

    json!({
        "type": "machine-learning-model",
        "bom-ref": bom_ref(index),
        "name": name,
        "hashes": [{"alg": "SHA-256", "content": file.sha256}],
        "properties": properties,
    })
}

fn vulnerability_for(finding: &Finding, index: usize, files: &[ScannedFile]) -> Value {
    let affected = files
        .iter()
        .position(|f| f.relative_path == finding.path)
        .unwrap_or(0);

    json!({
        "id": format!("{}-{:04}", finding.engine, index + 1),
        "source": {"name": finding.engine.as_str()},
        "description": finding.message,
        "ratings": [{"severity": severity_rating(finding.severity)}],
        "affects": [{"ref": bom_ref(affected)}],
        "properties": [
            {"name": "finding:category", "value": finding.category},
        ],
    })
}

/// Build the CycloneDX document.
///
/// One component per physical model file; vulnerability entries only for
/// findings that survived normalization.
pub fn generate(
    artifact_name: &str,
    files: &[ScannedFile],
    findings: &[Finding],
    generated_at: DateTime<Utc>,
) -> Value {
    let primary_hash = files.first().map(|f| f.sha256.as_str()).unwrap_or("");
    let serial = Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("modelgate-sbom:{primary_hash}").as_bytes(),
    );

    let components: Vec<Value> = files
        .iter()
        .enumerate()
        .map(|(i, f)| component_for(f, i))
        .collect();

    let vulnerabilities: Vec<Value> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| vulnerability_for(f, i, files))
        .collect();

    json!({
        "bomFormat": "CycloneDX",
        "specVersion": "1.6",
        "serialNumber": format!("urn:uuid:{serial}"),
        "version": 1,
        "metadata": {
            "timestamp": generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "tools": {
                "components": [{
                    "type": "application",
                    "name": "modelgate",
                    "version": SBOM_GENERATOR_VERSION,
                }]
            },
            "component": {
                "type": "machine-learning-model",
                "name": artifact_name,
                "hashes": [{"alg": "SHA-256", "content": primary_hash}],
            },
        },
        "components": components,
        "dependencies": [],
        "vulnerabilities": vulnerabilities,
    })
}

/// Recover header metadata from a model file without deserializing it.
///
/// Safetensors carries a JSON header prefixed by its little-endian length;
/// GGUF starts with a magic plus version word. Anything unreadable degrades
/// to empty metadata.
pub fn inspect_metadata(path: &Path, kind: ModelKind) -> ModelMetadata {
    let result = match kind {
        ModelKind::Safetensors => inspect_safetensors(path),
        ModelKind::Gguf => inspect_gguf(path),
        _ => return ModelMetadata::default(),
    };

    match result {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read model header metadata");
            ModelMetadata::default()
        }
    }
}

fn inspect_safetensors(path: &Path) -> std::io::Result<ModelMetadata> {
    let mut file = File::open(path)?;
    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let header_len = u64::from_le_bytes(len_bytes);
    if header_len == 0 || header_len > MAX_SAFETENSORS_HEADER {
        return Ok(ModelMetadata::default());
    }

    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;

    let mut metadata = ModelMetadata::default();
    if let Ok(header) = serde_json::from_slice::<Value>(&header_bytes) {
        if let Some(obj) = header.as_object() {
            metadata.tensor_count = Some(
                obj.keys()
                    .filter(|k| !k.starts_with("__"))
                    .count(),
            );
            if let Some(meta) = obj.get("__metadata__").and_then(Value::as_object) {
                metadata.declared_format = meta
                    .get("format")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                metadata.license = meta
                    .get("license")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
    }
    Ok(metadata)
}

fn inspect_gguf(path: &Path) -> std::io::Result<ModelMetadata> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != b"GGUF" {
        return Ok(ModelMetadata::default());
    }

    let mut version_bytes = [0u8; 4];
    file.read_exact(&mut version_bytes)?;
    Ok(ModelMetadata {
        declared_format: Some("gguf".to_string()),
        gguf_version: Some(u32::from_le_bytes(version_bytes)),
        ..Default::default()
    })
}

/// Whether a declared license restricts commercial use.
pub fn is_restrictive_license(license: &str) -> bool {
    const RESTRICTIVE: &[&str] = &[
        "non-commercial",
        "nc",
        "cc-by-nc",
        "research-only",
        "academic",
        "gpl",
        "agpl",
        "personal",
    ];
    let lower = license.to_ascii_lowercase();
    RESTRICTIVE.iter().any(|pattern| lower.contains(pattern))
}

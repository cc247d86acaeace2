//! Unified finding model
//!
//! Every scan engine produces findings in this unified format, allowing the
//! orchestrator to aggregate results from engines with disjoint native
//! schemas.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// External scan engine identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Structural model scanner
    Modelscan,
    /// Pickle deserialization scanner
    Picklescan,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modelscan => "modelscan",
            Self::Picklescan => "picklescan",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized unit of detected risk
///
/// Findings are immutable once produced. `path` is always relative to the
/// job's scan root; the extractor and adapters guarantee it never resolves
/// outside it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    /// Engine that produced this finding
    pub engine: EngineKind,
    /// Normalized severity
    pub severity: Severity,
    /// Rule, operator or dangerous-global identifier
    pub category: String,
    /// Set for findings that indicate unsafe deserialization behavior,
    /// consulted by the strict policy regardless of severity
    #[serde(default)]
    pub unsafe_deserialization: bool,
    /// Human-readable description
    pub message: String,
    /// Affected file, relative to the scan root
    pub path: String,
    /// Engine-native payload, preserved for audit
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    #[schema(value_type = Object)]
    pub raw: serde_json::Value,
}

/// Result of one engine invocation against one model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine: EngineKind,
    /// Engine version as reported by the tool, or "unknown"
    pub version: String,
    /// Process exit code; 0/1 are in-band for both engines (1 = findings)
    pub exit_code: i32,
    pub findings: Vec<Finding>,
    /// Engine-native output, preserved verbatim as the raw artifact
    pub raw_output: serde_json::Value,
    /// Populated when the invocation degraded but still produced a result
    pub error: Option<String>,
}

impl EngineResult {
    pub fn findings_count(&self) -> usize {
        self.findings.len()
    }
}

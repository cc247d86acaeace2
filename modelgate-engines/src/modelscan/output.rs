//! Modelscan output parsing types
//!
//! These types match the JSON report format of the modelscan CLI.

use serde::{Deserialize, Serialize};

/// Root modelscan JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelscanReport {
    /// Scan summary block (counts, timing); preserved but not interpreted
    #[serde(default)]
    pub summary: Option<serde_json::Value>,
    /// Detected issues
    #[serde(default)]
    pub issues: Vec<ModelscanIssue>,
    /// Scan-level errors reported by the tool itself
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

/// A single modelscan issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelscanIssue {
    /// Native severity label (CRITICAL/HIGH/MEDIUM/LOW)
    #[serde(default)]
    pub severity: String,
    /// Primary description
    #[serde(default)]
    pub description: Option<String>,
    /// Fallback message field used by some scanner modules
    #[serde(default)]
    pub message: Option<String>,
    /// Offending operator, when the issue is operator-based
    #[serde(default)]
    pub operator: Option<String>,
    /// Module the operator was imported from
    #[serde(default)]
    pub module: Option<String>,
    /// Source file the issue was found in
    #[serde(default)]
    pub source: Option<String>,
    /// Scanner module that raised the issue
    #[serde(default)]
    pub scanner: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_issue() {
        let json = r#"{
            "summary": {"total_issues": 1, "input_path": "/scan/model.pkl"},
            "issues": [
                {
                    "description": "Use of unsafe operator 'system' from module 'posix'",
                    "operator": "system",
                    "module": "posix",
                    "source": "/scan/model.pkl",
                    "scanner": "modelscan.scanners.PickleUnsafeOpScan",
                    "severity": "CRITICAL"
                }
            ],
            "errors": []
        }"#;

        let report: ModelscanReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, "CRITICAL");
        assert_eq!(report.issues[0].operator.as_deref(), Some("system"));
    }

    #[test]
    fn missing_sections_default_empty() {
        let report: ModelscanReport = serde_json::from_str("{}").unwrap();
        assert!(report.issues.is_empty());
        assert!(report.errors.is_empty());
        assert!(report.summary.is_none());
    }
}

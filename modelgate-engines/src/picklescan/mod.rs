//! Picklescan adapter
//!
//! Picklescan reports to stdout as text. The adapter extracts dangerous
//! globals from that output, flags every finding as unsafe deserialization,
//! and preserves the raw stdout/stderr/exit-code triple as the engine-native
//! payload.

use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

use modelgate_core::config::EngineConfig;
use modelgate_core::domain::engine::{EngineError, ScanEngine};
use modelgate_core::domain::finding::{EngineKind, EngineResult, Finding, Severity};
use modelgate_core::domain::format::ModelKind;

use crate::executor::{probe_version, run_engine};

/// Matches lines like `Dangerous global 'system' in module 'os'`.
static DANGEROUS_GLOBAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)dangerous.*?'([^']+)'.*?module\s*'([^']+)'")
        .expect("dangerous-global pattern is valid")
});

/// Pickle deserialization scanner adapter
pub struct PicklescanEngine {
    config: EngineConfig,
}

impl PicklescanEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

/// Extract normalized findings from picklescan's text output.
///
/// Dangerous globals are High; an infection summary with no attributable
/// global becomes a single Critical finding so a positive scan can never
/// normalize to zero findings.
pub fn parse_stdout(stdout: &str, exit_code: i32, relative_path: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    for caps in DANGEROUS_GLOBAL_RE.captures_iter(stdout) {
        let global = &caps[1];
        let module = &caps[2];
        findings.push(Finding {
            engine: EngineKind::Picklescan,
            severity: Severity::High,
            category: "dangerous-global".to_string(),
            unsafe_deserialization: true,
            message: format!("Dangerous global '{global}' found in module '{module}'"),
            path: relative_path.to_string(),
            raw: serde_json::json!({"global": global, "module": module}),
        });
    }

    if findings.is_empty() && exit_code == 1 && stdout.to_ascii_lowercase().contains("infected") {
        findings.push(Finding {
            engine: EngineKind::Picklescan,
            severity: Severity::Critical,
            category: "infection".to_string(),
            unsafe_deserialization: true,
            message: "Picklescan detected malicious serialized content".to_string(),
            path: relative_path.to_string(),
            raw: serde_json::json!({"stdout": stdout}),
        });
    }

    findings
}

#[async_trait]
impl ScanEngine for PicklescanEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Picklescan
    }

    fn supports(&self, kind: ModelKind) -> bool {
        kind.is_pickle_based()
    }

    #[instrument(skip(self), fields(engine = "picklescan"))]
    async fn scan(&self, target: &Path, workdir: &Path) -> Result<EngineResult, EngineError> {
        let version = probe_version(&self.config.executable, "--help").await;

        let target_str = target.to_string_lossy();
        let out = run_engine(
            EngineKind::Picklescan,
            &self.config.executable,
            &["--path", target_str.as_ref()],
            workdir,
            self.config.timeout(),
        )
        .await?;

        // 0 = clean, 1 = infected; anything else is a crash.
        if out.exit_code > 1 || out.exit_code < 0 {
            return Err(EngineError::Crashed {
                engine: EngineKind::Picklescan,
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }

        let relative = target
            .strip_prefix(workdir)
            .unwrap_or(target)
            .to_string_lossy()
            .into_owned();
        let findings = parse_stdout(&out.stdout, out.exit_code, &relative);

        Ok(EngineResult {
            engine: EngineKind::Picklescan,
            version,
            exit_code: out.exit_code,
            findings,
            raw_output: serde_json::json!({
                "stdout": out.stdout,
                "stderr": out.stderr,
                "exit_code": out.exit_code,
            }),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_dangerous_globals() {
        let stdout = "Scanning model.pkl\n\
                      Dangerous global 'system' in module 'os'\n\
                      Dangerous global 'eval' in module 'builtins'\n";
        let findings = parse_stdout(stdout, 1, "model.pkl");
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.unsafe_deserialization));
        assert!(findings.iter().all(|f| f.severity == Severity::High));
        assert_eq!(findings[0].raw["module"], "os");
        assert_eq!(findings[1].message, "Dangerous global 'eval' found in module 'builtins'");
    }

    #[test]
    fn infection_without_globals_is_critical() {
        let findings = parse_stdout("1 file infected, 0 clean\n", 1, "model.pkl");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].category, "infection");
        assert!(findings[0].unsafe_deserialization);
    }

    #[test]
    fn clean_output_yields_no_findings() {
        let findings = parse_stdout("Scanned 1 file, nothing dangerous found\n", 0, "model.pkl");
        assert!(findings.is_empty());
    }

    #[test]
    fn infection_marker_on_clean_exit_is_ignored() {
        // Exit 0 means the engine itself concluded clean; a stray word in
        // the banner must not fabricate a finding.
        let findings = parse_stdout("checking infected-samples dir listing\n", 0, "model.pkl");
        assert!(findings.is_empty());
    }
}

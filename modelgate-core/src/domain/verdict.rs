//! Policy verdict types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::finding::Severity;

/// Job-level pass/fail outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassFail {
    Pass,
    Fail,
}

impl std::fmt::Display for PassFail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Outcome of policy evaluation over a job's full finding sequence
///
/// Computed once per job; immutable afterwards. Identical findings and flags
/// always yield an identical verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Verdict {
    pub pass_fail: PassFail,
    /// When FAIL, cites the single highest-severity triggering finding
    pub reason: Option<String>,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub total_findings: usize,
}

impl Verdict {
    pub fn is_fail(&self) -> bool {
        self.pass_fail == PassFail::Fail
    }
}

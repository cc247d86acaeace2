//! Policy evaluation
//!
//! Reduces a job's full finding sequence plus the strict flag into a
//! verdict. Evaluation is a pure function: identical findings and flags
//! always yield an identical verdict.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use modelgate_core::domain::finding::{EngineKind, Finding, Severity};
use modelgate_core::domain::verdict::{PassFail, Verdict};

/// Evaluate the finding sequence under the given policy.
///
/// Under `strict`, any High/Critical finding — or any unsafe-deserialization
/// finding regardless of severity — forces FAIL, and the reason cites the
/// single highest-severity trigger (ties: deserialization engine first, then
/// emission order). Under non-strict, findings are recorded but never force
/// FAIL.
pub fn evaluate(findings: &[Finding], strict: bool) -> Verdict {
    let mut findings_by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
    for finding in findings {
        *findings_by_severity.entry(finding.severity).or_insert(0) += 1;
    }
    let total_findings = findings.len();

    if !strict {
        return Verdict {
            pass_fail: PassFail::Pass,
            reason: None,
            findings_by_severity,
            total_findings,
        };
    }

    let trigger = findings
        .iter()
        .enumerate()
        .filter(|(_, f)| f.severity >= Severity::High || f.unsafe_deserialization)
        .max_by_key(|(idx, f)| {
            (
                f.severity,
                f.engine == EngineKind::Picklescan,
                Reverse(*idx),
            )
        });

    match trigger {
        Some((_, finding)) => Verdict {
            pass_fail: PassFail::Fail,
            reason: Some(format!(
                "{}: {} - {}",
                finding.engine, finding.severity, finding.message
            )),
            findings_by_severity,
            total_findings,
        },
        None => Verdict {
            pass_fail: PassFail::Pass,
            reason: None,
            findings_by_severity,
            total_findings,
        },
    }
}

/// Escalate a passing verdict when engines failed under strict policy.
///
/// An engine that could not complete cannot certify safety; the first
/// recorded failure becomes the FAIL reason. A verdict that already fails
/// keeps its finding-based reason.
pub fn apply_engine_failures(verdict: Verdict, engine_failures: &[String], strict: bool) -> Verdict {
    if strict && verdict.pass_fail == PassFail::Pass {
        if let Some(first) = engine_failures.first() {
            return Verdict {
                pass_fail: PassFail::Fail,
                reason: Some(format!("engine failure prevents certification: {first}")),
                ..verdict
            };
        }
    }
    verdict
}

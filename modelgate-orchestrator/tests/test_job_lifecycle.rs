//! End-to-end job lifecycle tests against stub engines.

mod common;

use std::sync::Arc;
use std::time::Duration;

use modelgate_core::domain::finding::Severity;
use modelgate_core::domain::verdict::PassFail;
use modelgate_orchestrator::domain::value_objects::{JobOptions, JobStatus};
use modelgate_orchestrator::infrastructure::artifacts;

use common::{spawn_test_app, submit_upload, wait_terminal, StubEngine, DANGEROUS_MARKER};

fn strict_options() -> JobOptions {
    JobOptions {
        enable_picklescan: true,
        strict_policy: true,
        run_sbom_on_fail: true,
    }
}

#[tokio::test]
async fn clean_pickle_passes_under_strict_policy() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization()),
        ],
        2,
        None,
    );

    let job_id = submit_upload(&app, "model.pkl", b"plain dict of ints", strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.pass_fail, Some(PassFail::Pass));
    assert!(job.fail_reason.is_none());
    assert!(job.error.is_none());
    assert_eq!(
        job.findings_by_severity
            .get(&Severity::High)
            .copied()
            .unwrap_or(0)
            + job
                .findings_by_severity
                .get(&Severity::Critical)
                .copied()
                .unwrap_or(0),
        0
    );
    assert!(job.engines_run.iter().any(|e| e == "modelscan"));
    assert!(job.engines_run.iter().any(|e| e == "picklescan"));

    // Full artifact set is published.
    let results_dir = artifacts::job_results_dir(&app.results_root, job_id);
    assert!(results_dir.join("summary.json").is_file());
    assert!(results_dir.join("aisbom.json").is_file());
    assert!(results_dir.join("artifacts.zip").is_file());
}

#[tokio::test]
async fn dangerous_pickle_fails_with_deserialization_reason() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization()),
        ],
        2,
        None,
    );

    let mut content = b"pickle ".to_vec();
    content.extend_from_slice(DANGEROUS_MARKER);
    let job_id = submit_upload(&app, "payload.pkl", &content, strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.pass_fail, Some(PassFail::Fail));
    // Severity tie between engines resolves to the deserialization scanner.
    assert!(job.fail_reason.as_deref().unwrap().contains("picklescan"));
    // A clean FAIL verdict is not a pipeline malfunction.
    assert!(job.error.is_none());

    let results_dir = artifacts::job_results_dir(&app.results_root, job_id);
    let sbom: serde_json::Value =
        serde_json::from_slice(&std::fs::read(results_dir.join("aisbom.json")).unwrap()).unwrap();
    assert!(!sbom["vulnerabilities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn non_strict_policy_records_findings_but_passes() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization()),
        ],
        2,
        None,
    );

    let mut content = b"pickle ".to_vec();
    content.extend_from_slice(DANGEROUS_MARKER);
    let options = JobOptions {
        strict_policy: false,
        ..strict_options()
    };
    let job_id = submit_upload(&app, "payload.pkl", &content, options).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.pass_fail, Some(PassFail::Pass));
    assert!(job.total_findings > 0);
}

#[tokio::test]
async fn picklescan_is_skipped_for_tensor_formats() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization()),
        ],
        2,
        None,
    );

    let job_id = submit_upload(&app, "weights.safetensors", b"tensor bytes", strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job
        .warnings
        .iter()
        .any(|w| w.contains("picklescan") && w.contains("skipped")));
    assert!(!job.engines_run.iter().any(|e| e == "picklescan"));
}

#[tokio::test]
async fn engine_failure_forces_fail_under_strict_policy() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization().failing()),
        ],
        2,
        None,
    );

    let job_id = submit_upload(&app, "model.pkl", b"benign", strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    // The structural engine completed, so the pipeline itself succeeded;
    // strict policy turns the picklescan failure into a FAIL verdict.
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.pass_fail, Some(PassFail::Fail));
    assert!(job
        .fail_reason
        .as_deref()
        .unwrap()
        .contains("engine failure"));
    assert!(!job.warnings.is_empty());
}

#[tokio::test]
async fn engine_failure_is_a_warning_under_lenient_policy() {
    let app = spawn_test_app(
        vec![
            Arc::new(StubEngine::structural()),
            Arc::new(StubEngine::deserialization().failing()),
        ],
        2,
        None,
    );

    let options = JobOptions {
        strict_policy: false,
        ..strict_options()
    };
    let job_id = submit_upload(&app, "model.pkl", b"benign", options).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.pass_fail, Some(PassFail::Pass));
    assert!(!job.warnings.is_empty());
}

#[tokio::test]
async fn unsupported_single_input_never_reaches_an_engine() {
    let counter = StubEngine::structural();
    let invocations = counter.peak_concurrent.clone();
    let app = spawn_test_app(vec![Arc::new(counter)], 2, None);

    // The extension table accepts .bin, so fake the mismatch with an
    // archive whose magic does not corroborate the extension.
    let job_id = submit_upload(&app, "payload.zip", b"not really a zip", strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("detect"));
    assert!(job.pass_fail.is_none());
    assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn running_jobs_never_exceed_the_concurrency_bound() {
    let engine = StubEngine::structural().with_delay(Duration::from_millis(120));
    let app = spawn_test_app(vec![Arc::new(engine)], 2, None);

    let mut job_ids = Vec::new();
    for i in 0..6 {
        job_ids.push(
            submit_upload(
                &app,
                &format!("model_{i}.safetensors"),
                b"tensor bytes",
                strict_options(),
            )
            .await,
        );
    }

    // Sample the registry while the queue drains.
    let mut peak_running = 0usize;
    for _ in 0..200 {
        let jobs = app.job_store.list().await.unwrap();
        let running = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        peak_running = peak_running.max(running);
        if jobs.iter().all(|j| j.status.is_terminal()) && jobs.len() == 6 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(
        peak_running <= 2,
        "observed {peak_running} concurrently running jobs with a bound of 2"
    );
    for job_id in job_ids {
        let job = wait_terminal(&app, job_id).await;
        assert_eq!(job.status, JobStatus::Succeeded);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn real_picklescan_adapter_flows_through_the_pipeline() {
    use modelgate_core::config::EngineConfig;
    use modelgate_engines::PicklescanEngine;
    use std::os::unix::fs::PermissionsExt;

    // A stand-in executable that reports a dangerous global the way the
    // real tool does.
    let bin_dir = tempfile::tempdir().unwrap();
    let script = bin_dir.path().join("picklescan-stub");
    std::fs::write(
        &script,
        "#!/bin/sh\necho \"Dangerous global 'system' in module 'os'\"\nexit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let engine = PicklescanEngine::new(EngineConfig {
        enabled: true,
        executable: script.to_string_lossy().into_owned(),
        timeout_seconds: 30,
    });
    let app = spawn_test_app(vec![Arc::new(engine)], 1, None);

    let job_id = submit_upload(&app, "model.pkl", b"payload", strict_options()).await;
    let job = wait_terminal(&app, job_id).await;

    assert_eq!(job.pass_fail, Some(PassFail::Fail));
    assert!(job.fail_reason.as_deref().unwrap().contains("picklescan"));
    assert_eq!(job.findings_by_engine.get("picklescan"), Some(&1));
}

//! Setup and cleanup collaborator scripts
#![cfg(unix)]

use minharness::{Error, Exit, RecordingReporter, Report, RunParams, SuiteRequest};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// A base directory with an `env` suite and the given collaborator scripts
fn base_with(scripts: &[(&str, &str)]) -> TempDir {
    let base = TempDir::new().unwrap();
    fs::create_dir(base.path().join("env")).unwrap();
    fs::write(
        base.path().join("env/ready.test.txt"),
        "success \"env is up\" true\n",
    )
    .unwrap();
    for (name, body) in scripts {
        fs::write(base.path().join(name), body).unwrap();
    }
    base
}

fn execute(base: &TempDir, params: RunParams) -> (Report, RecordingReporter) {
    let recorder = RecordingReporter::default();
    let report = minharness::harness(base.path())
        .params(params)
        .suite(SuiteRequest::new("env", "Env"))
        .reporter(recorder.clone())
        .handle_signals(false)
        .execute()
        .unwrap();
    (report, recorder)
}

#[test]
fn readiness_line_starts_the_suite() {
    let base = base_with(&[(
        "env.setup.sh",
        "echo starting\necho 0\nsleep 5\n",
    )]);

    let (report, recorder) = execute(&base, RunParams::new());

    assert!(report.success(), "{:?}", report.exit);
    assert_eq!(recorder.captions(), vec!["env is up"]);
    assert!(!base.path().join(".tmp").exists());
}

#[test]
fn exit_code_counts_without_a_readiness_line() {
    let base = base_with(&[("env.setup.sh", "echo preparing\nexit 0\n")]);

    let (report, _) = execute(&base, RunParams::new());
    assert!(report.success(), "{:?}", report.exit);
}

#[test]
fn nonzero_readiness_code_is_fatal() {
    let base = base_with(&[("env.setup.sh", "echo 3\nsleep 5\n")]);

    let (report, recorder) = execute(&base, RunParams::new());

    match &report.exit {
        Exit::Fatal(Error::SetupFailed { code, .. }) => assert_eq!(*code, 3),
        other => panic!("expected a setup failure, got {:?}", other),
    }
    assert!(recorder.cases().is_empty());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn silent_setup_times_out() {
    let base = base_with(&[("env.setup.sh", "sleep 5\n")]);

    let (report, _) = execute(
        &base,
        RunParams::new().setup_timeout(Duration::from_millis(100)),
    );

    assert!(matches!(
        report.exit,
        Exit::Fatal(Error::SetupTimeout { .. })
    ));
    let message = match &report.exit {
        Exit::Fatal(e) => e.to_string(),
        _ => unreachable!(),
    };
    assert!(message.starts_with("Environmental setup has timed out"));
}

#[test]
fn cleanup_runs_at_shutdown_with_workload_args() {
    let base = TempDir::new().unwrap();
    let marker = base.path().join("cleaned");
    let base = {
        let script = format!(
            "ls \"$MINHARNESS_SCRATCH\" > /dev/null && echo \"$1 $2\" > '{}'\n",
            marker.display()
        );
        fs::create_dir(base.path().join("env")).unwrap();
        fs::write(base.path().join("env/ready.test.txt"), "success up true\n").unwrap();
        fs::write(base.path().join("env.cleanup.sh"), script).unwrap();
        base
    };

    let (report, _) = execute(&base, RunParams::new());

    assert!(report.success());
    let recorded = fs::read_to_string(&marker).unwrap();
    let scratch = base.path().join(".tmp");
    assert_eq!(recorded.trim(), format!("--path {}", scratch.display()));
}

#[test]
fn suites_without_collaborators_just_run() {
    let base = base_with(&[("other.setup.sh", "exit 1\n")]);

    let (report, recorder) = execute(&base, RunParams::new());
    assert!(report.success());
    assert_eq!(recorder.captions(), vec!["env is up"]);
}

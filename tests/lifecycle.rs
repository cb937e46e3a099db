//! Idle timeout, fatal errors and run teardown

use minharness::report::Event;
use minharness::run::block_on;
use minharness::{
    comparators, Asserter, Error, Exit, Expression, Harness, RecordingReporter, Result, RunParams,
    SuiteRequest, ThrowPolicy, Value,
};
use serde_json::json;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;

fn suite_dir(name: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(name)).unwrap();
    fs::write(dir.path().join(name).join("main.test.txt"), "").unwrap();
    dir
}

fn run_with<L>(params: RunParams, request: SuiteRequest, loader: L) -> (RecordingReporter, i32, Exit)
where
    L: Fn(&Path, &Asserter) -> Result<()> + 'static,
{
    let recorder = RecordingReporter::default();
    let harness = Harness::with_parts(params, Box::new(recorder.clone()), Rc::new(loader)).unwrap();
    let report = block_on(async {
        let exit = harness.drive(vec![request], false).await;
        harness.shutdown(exit)
    })
    .unwrap();
    let code = report.exit_code();
    (recorder, code, report.exit)
}

#[test]
fn idle_timeout_ends_a_quiet_run() {
    let dir = suite_dir("net");
    let params = RunParams::new()
        .base_dir(dir.path())
        .idle_timeout(Duration::from_millis(40));

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("net", "Net").use_timeout(true),
        |_: &Path, asserter: &Asserter| -> Result<()> {
            asserter.assert_success("reachable", Expression::deferred(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, anyhow::Error>(true)
            }))
        },
    );

    assert!(matches!(exit, Exit::Idle));
    assert_eq!(code, 0);
    assert!(matches!(
        recorder.events().last(),
        Some(Event::Summary(counters)) if counters.succeeded == 1
    ));
}

#[test]
fn stalled_assertion_is_a_runtime_error() {
    let dir = suite_dir("net");
    let params = RunParams::new()
        .base_dir(dir.path())
        .idle_timeout(Duration::from_millis(40));

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("net", "Net").use_timeout(true),
        |_: &Path, asserter: &Asserter| -> Result<()> {
            asserter.assert_success("answers", true)?;
            asserter.assert_success(
                "hangs",
                Expression::deferred(std::future::pending::<anyhow::Result<Value>>()),
            )
        },
    );

    match exit {
        Exit::Fatal(Error::IdleStall { suite, pending }) => {
            assert_eq!(suite, "Net");
            assert_eq!(pending, vec!["hangs".to_string()]);
        }
        other => panic!("expected a stall, got {:?}", other),
    }
    assert_eq!(code, 1);
    assert!(matches!(recorder.events().last(), Some(Event::RuntimeError(_))));
    assert!(!recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::Summary(_))));
}

#[test]
fn zero_assertions_print_no_summary() {
    let dir = suite_dir("empty");
    let params = RunParams::new().base_dir(dir.path());

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("empty", "Empty"),
        |_: &Path, _: &Asserter| -> Result<()> { Ok(()) },
    );

    assert!(matches!(exit, Exit::Drained));
    assert_eq!(code, 0);
    assert_eq!(recorder.events().len(), 1);
    assert!(matches!(&recorder.events()[0], Event::Suite(name) if name == "Empty"));
}

#[test]
fn failures_set_the_exit_code() {
    let dir = suite_dir("math");
    let params = RunParams::new().base_dir(dir.path());

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("math", "Math").comparator(comparators::equal()),
        |_: &Path, asserter: &Asserter| -> Result<()> {
            asserter.assert("one", json!(1), json!(1))?;
            asserter.assert("two", json!(2), json!(3))
        },
    );

    assert!(matches!(exit, Exit::Drained));
    assert_eq!(code, 1);
    assert!(matches!(
        recorder.events().last(),
        Some(Event::Summary(counters)) if counters.succeeded == 1 && counters.failed == 1
    ));
}

#[test]
fn throwing_expression_under_a_comparator_is_fatal() {
    let dir = suite_dir("math");
    let params = RunParams::new().base_dir(dir.path());

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("math", "Math").comparator(comparators::equal()),
        |_: &Path, asserter: &Asserter| -> Result<()> {
            asserter.assert("fine", json!("a"), json!("a"))?;
            asserter.assert(
                "boom",
                Expression::producer(|| -> anyhow::Result<Value> { anyhow::bail!("boom") }),
                json!(1),
            )?;
            asserter.assert("never", json!(1), json!(1))
        },
    );

    match &exit {
        Exit::Fatal(Error::Load { source, .. }) => {
            assert!(matches!(**source, Error::ExpressionThrew { ref caption, .. } if caption == "boom"));
        }
        other => panic!("expected a fatal load error, got {:?}", other),
    }
    assert_eq!(code, 1);
    assert_eq!(recorder.captions(), vec!["fine"]);
}

#[test]
fn record_policy_counts_throws_as_failures() {
    let dir = suite_dir("math");
    let params = RunParams::new()
        .base_dir(dir.path())
        .throw_policy(ThrowPolicy::Record);

    let (recorder, code, exit) = run_with(
        params,
        SuiteRequest::new("math", "Math").comparator(comparators::equal()),
        |_: &Path, asserter: &Asserter| -> Result<()> {
            asserter.assert(
                "boom",
                Expression::producer(|| -> anyhow::Result<Value> { anyhow::bail!("boom") }),
                json!(1),
            )?;
            asserter.assert("after", json!(1), json!(1))
        },
    );

    assert!(matches!(exit, Exit::Drained));
    assert_eq!(code, 1);
    let cases = recorder.cases();
    assert_eq!(cases.len(), 2);
    assert!(!cases[0].passed);
    assert_eq!(cases[0].actual, Some(json!("boom")));
    assert!(cases[1].passed);
}

#[test]
fn shutdown_handlers_run_before_scratch_removal() {
    let dir = suite_dir("math");
    let params = RunParams::new().base_dir(dir.path());
    let recorder = RecordingReporter::default();
    let loader = |_: &Path, asserter: &Asserter| -> Result<()> {
        asserter.assert_success("ok", true)
    };
    let harness = Harness::with_parts(params, Box::new(recorder.clone()), Rc::new(loader)).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second"] {
        let seen = seen.clone();
        let scratch = harness.scratch_dir().to_path_buf();
        harness.on_shutdown(name, move || {
            seen.borrow_mut().push((name, scratch.exists()));
            Ok(())
        });
    }

    let report = block_on(async {
        let exit = harness
            .drive(vec![SuiteRequest::new("math", "Math")], false)
            .await;
        harness.shutdown(exit)
    })
    .unwrap();

    assert!(report.success());
    assert_eq!(*seen.borrow(), vec![("first", true), ("second", true)]);
    assert!(!harness.scratch_dir().exists());
}

#[test]
fn interrupted_run_reports_nothing() {
    let dir = suite_dir("net");
    let params = RunParams::new().base_dir(dir.path());
    let recorder = RecordingReporter::default();
    let loader = |_: &Path, asserter: &Asserter| -> Result<()> {
        asserter.assert_success("ok", true)?;
        asserter.harness().interrupt();
        Ok(())
    };
    let harness = Harness::with_parts(params, Box::new(recorder.clone()), Rc::new(loader)).unwrap();

    let report = block_on(async {
        let exit = harness
            .drive(vec![SuiteRequest::new("net", "Net")], false)
            .await;
        harness.shutdown(exit)
    })
    .unwrap();

    assert!(matches!(report.exit, Exit::Interrupted));
    assert_eq!(report.exit_code(), 130);
    assert!(!recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::Summary(_) | Event::RuntimeError(_))));
}

#[test]
fn queued_suite_never_starts_after_a_fatal_rejection() {
    let dir = TempDir::new().unwrap();
    for name in ["a", "b"] {
        fs::create_dir(dir.path().join(name)).unwrap();
        fs::write(dir.path().join(name).join("main.test.txt"), "").unwrap();
    }
    let params = RunParams::new().base_dir(dir.path());
    let recorder = RecordingReporter::default();
    let loader = |_: &Path, asserter: &Asserter| -> Result<()> {
        match asserter.suite() {
            "A" => asserter.assert(
                "rejects",
                Expression::deferred(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<Value, _>(anyhow::anyhow!("rejected"))
                }),
                json!(1),
            ),
            _ => asserter.assert_success("b ran", true),
        }
    };
    let harness = Harness::with_parts(params, Box::new(recorder.clone()), Rc::new(loader)).unwrap();

    let report = block_on(async {
        let exit = harness
            .drive(
                vec![
                    SuiteRequest::new("a", "A").comparator(comparators::equal()),
                    SuiteRequest::new("b", "B"),
                ],
                false,
            )
            .await;
        harness.shutdown(exit)
    })
    .unwrap();

    assert!(matches!(
        report.exit,
        Exit::Fatal(Error::ExpressionThrew { ref caption, .. }) if caption == "rejects"
    ));
    assert_eq!(recorder.captions(), vec!["rejects"]);
    assert!(!recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::Suite(name) if name == "B")));
    assert!(matches!(recorder.events().last(), Some(Event::RuntimeError(_))));
    assert_eq!(harness.queued(), 1);
}

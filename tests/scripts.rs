//! End-to-end runs of `.test.txt` scripts

use minharness::{comparators, Error, Exit, RecordingReporter, Report, SuiteRequest};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_suite(base: &Path, dir: &str, files: &[(&str, &str)]) {
    fs::create_dir_all(base.join(dir)).unwrap();
    for (name, content) in files {
        fs::write(base.join(dir).join(name), content).unwrap();
    }
}

fn execute(base: &TempDir, suites: Vec<SuiteRequest>) -> (Report, RecordingReporter) {
    let recorder = RecordingReporter::default();
    let report = minharness::harness(base.path())
        .suites(suites)
        .reporter(recorder.clone())
        .handle_signals(false)
        .execute()
        .unwrap();
    (report, recorder)
}

#[test]
fn literals_and_comparators() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "math",
        &[(
            "literals.test.txt",
            r#"# numbers and strings
assert "two is two" 2 == 2
assert words hello == hello
assert "loose match" "3" == 3
assert mismatch 4 == 5
"#,
        )],
    );

    let (report, recorder) = execute(
        &base,
        vec![SuiteRequest::new("math", "Math").comparator(comparators::loose())],
    );

    assert_eq!(
        recorder.captions(),
        vec!["two is two", "words", "loose match", "mismatch"]
    );
    assert_eq!(report.counters.succeeded, 3);
    assert_eq!(report.counters.failed, 1);
    assert_eq!(report.exit_code(), 1);

    let mismatch = &recorder.cases()[3];
    assert_eq!(mismatch.actual, Some(json!(4)));
    assert_eq!(mismatch.expected, Some(json!(5)));
}

#[test]
fn success_entries_check_truthiness() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "truth",
        &[(
            "truth.test.txt",
            "success yes true\nsuccess nothing null\nsuccess zero 0\nsuccess thrown fail went wrong\n",
        )],
    );

    let (report, recorder) = execute(&base, vec![SuiteRequest::new("truth", "Truth")]);

    let passed: Vec<bool> = recorder.cases().iter().map(|c| c.passed).collect();
    assert_eq!(passed, vec![true, false, false, false]);
    assert!(matches!(report.exit, Exit::Drained));
}

#[cfg(unix)]
#[test]
fn file_blocks_and_exec() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "files",
        &[(
            "files.test.txt",
            r#"assert "reads block" exec cat answer.txt == 42
assert "later" exec cat greeting.txt & == hello
success "suite name" $SUITE
success "scratch listing" exec ls $SCRATCH

-- answer.txt --
42
-- greeting.txt --
hello
"#,
        )],
    );

    let (report, recorder) = execute(
        &base,
        vec![SuiteRequest::new("files", "Files").comparator(comparators::equal())],
    );

    assert!(report.success(), "cases: {:?}", recorder.cases());
    assert_eq!(report.counters.succeeded, 4);
}

#[test]
fn conditions_skip_entries() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "cond",
        &[(
            "cond.test.txt",
            "[fast] success fast true\n[!fast] success slow true\n[exec:definitely-not-a-program-1234] success tool true\n",
        )],
    );

    let recorder = RecordingReporter::default();
    minharness::harness(base.path())
        .suite(SuiteRequest::new("cond", "Cond"))
        .condition("fast", true)
        .reporter(recorder.clone())
        .handle_signals(false)
        .execute()
        .unwrap();

    assert_eq!(recorder.captions(), vec!["fast"]);
}

#[test]
fn parse_error_is_fatal_with_context() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "broken",
        &[("broken.test.txt", "assert ok 1 == 1\nexpect nothing\n")],
    );

    let (report, recorder) = execute(
        &base,
        vec![SuiteRequest::new("broken", "Broken").comparator(comparators::equal())],
    );

    assert_eq!(report.exit_code(), 1);
    let Exit::Fatal(Error::Load { source, .. }) = &report.exit else {
        panic!("expected a load error, got {:?}", report.exit);
    };
    let message = source.to_string();
    assert!(message.contains("at line 2"), "{message}");
    assert!(message.contains("> 2 | expect nothing"), "{message}");
    assert!(recorder.cases().is_empty());
}

#[test]
fn throwing_script_expression_stops_the_run() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "math",
        &[("boom.test.txt", "assert fine 1 == 1\nassert boom fail boom == 1\nassert never 1 == 1\n")],
    );
    write_suite(base.path(), "other", &[("other.test.txt", "success other true\n")]);

    let (report, recorder) = execute(
        &base,
        vec![
            SuiteRequest::new("math", "Math").comparator(comparators::equal()),
            SuiteRequest::new("other", "Other"),
        ],
    );

    assert!(matches!(report.exit, Exit::Fatal(_)));
    assert_eq!(recorder.captions(), vec!["fine"]);
    assert!(matches!(
        recorder.events().last(),
        Some(minharness::report::Event::RuntimeError(message)) if message.contains("boom")
    ));
}

#[test]
fn files_load_in_name_order() {
    let base = TempDir::new().unwrap();
    write_suite(
        base.path(),
        "order",
        &[
            ("b.test.txt", "success second true\n"),
            ("a.test.txt", "success first true\n"),
            ("c.txt", "success ignored true\n"),
        ],
    );

    let (_, recorder) = execute(&base, vec![SuiteRequest::new("order", "Order")]);
    assert_eq!(recorder.captions(), vec!["first", "second"]);
}

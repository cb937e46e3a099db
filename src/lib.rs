//! # minharness
//!
//! A minimal test harness. Suites are directories of test files; each suite
//! publishes an assertion entry point bound to its comparator, loads its files,
//! and the harness counts passes and failures and reports them through the
//! process exit code.
//!
//! Assertions may settle asynchronously. The harness serializes suites: a
//! suite requested while another one still has assertions in flight is queued
//! and activated once the in-flight depth drops back to zero.
//!
//! Test files are `.test.txt` scripts by default (see [`parser`]), but any
//! [`Loader`] can feed the entry point.

pub mod error;
pub mod manifest;
pub mod outcome;
pub mod parser;
pub mod report;
pub mod run;

pub use error::{Error, Result};
pub use outcome::{comparators, Comparator, Expression, Outcome, Value, Verdict};
pub use report::{ColorSetting, ConsoleReporter, Counters, RecordingReporter, Reporter, Rgb};
pub use run::{
    Asserter, Exit, Harness, Loader, Report, RunParams, ScriptLoader, SuiteRequest, ThrowPolicy,
};

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Builder for configuring and running suites
///
/// # Examples
///
/// ```no_run
/// use minharness::{comparators, SuiteRequest};
///
/// let report = minharness::harness("test")
///     .suite(
///         SuiteRequest::new("math", "Math")
///             .color([120, 40, 200])
///             .comparator(comparators::equal()),
///     )
///     .suite(SuiteRequest::new("net", "Net").use_timeout(true))
///     .execute()
///     .unwrap();
///
/// std::process::exit(report.exit_code());
/// ```
pub struct Builder {
    params: RunParams,
    suites: Vec<SuiteRequest>,
    reporter: Option<Box<dyn Reporter>>,
    loader: Option<Rc<dyn Loader>>,
    handle_signals: bool,
}

impl Builder {
    fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            params: RunParams::new().base_dir(base_dir),
            suites: Vec::new(),
            reporter: None,
            loader: None,
            handle_signals: true,
        }
    }

    /// Queue a suite; suites run in the order they are added
    pub fn suite(mut self, request: SuiteRequest) -> Self {
        self.suites.push(request);
        self
    }

    pub fn suites(mut self, requests: impl IntoIterator<Item = SuiteRequest>) -> Self {
        self.suites.extend(requests);
        self
    }

    /// Replace all parameters except the base directory
    pub fn params(mut self, params: RunParams) -> Self {
        let base_dir = std::mem::take(&mut self.params.base_dir);
        self.params = params.base_dir(base_dir);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.params = self.params.idle_timeout(timeout);
        self
    }

    pub fn throw_policy(mut self, policy: ThrowPolicy) -> Self {
        self.params = self.params.throw_policy(policy);
        self
    }

    /// Set a condition value for conditional script entries
    pub fn condition(mut self, name: &str, value: bool) -> Self {
        self.params = self.params.condition(name, value);
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Rc::new(loader));
        self
    }

    /// Whether SIGINT/SIGTERM end the run (default: yes)
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Run every suite and tear down
    ///
    /// # Returns
    /// The run's report; `Err` only if the harness could not start (e.g. the
    /// scratch directory could not be created).
    pub fn execute(self) -> Result<Report> {
        let Builder {
            params,
            suites,
            reporter,
            loader,
            handle_signals,
        } = self;

        run::block_on(async move {
            let harness = Harness::with_parts(
                params,
                reporter.unwrap_or_else(|| Box::new(ConsoleReporter::default()) as Box<dyn Reporter>),
                loader.unwrap_or_else(|| Rc::new(ScriptLoader) as Rc<dyn Loader>),
            )?;
            let exit = harness.drive(suites, handle_signals).await;
            Ok::<_, Error>(harness.shutdown(exit))
        })?
    }
}

/// Create a new builder for suites under `base_dir`
pub fn harness(base_dir: impl Into<PathBuf>) -> Builder {
    Builder::new(base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn builder_runs_a_script_suite() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("math")).unwrap();
        fs::write(
            dir.path().join("math/adds.test.txt"),
            "assert adds 2 == 2\nsuccess \"non-empty\" hello\n",
        )
        .unwrap();

        let recorder = RecordingReporter::default();
        let report = harness(dir.path())
            .suite(SuiteRequest::new("math", "Math").comparator(comparators::equal()))
            .reporter(recorder.clone())
            .handle_signals(false)
            .execute()
            .unwrap();

        assert!(matches!(report.exit, Exit::Drained));
        assert_eq!(report.counters.succeeded, 2);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(recorder.captions(), vec!["adds", "non-empty"]);
        assert!(!dir.path().join(".tmp").exists());
    }
}

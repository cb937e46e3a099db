//! The harness object owning counters, in-flight depth and the suite queue

use crate::error::Result;
use crate::outcome::{Comparator, Expression, Value};
use crate::report::{ConsoleReporter, Counters, Reporter};
use crate::run::environment::Environment;
use crate::run::execution::{Loader, ScriptLoader};
use crate::run::lifecycle::Lifecycle;
use crate::run::params::{RunParams, SuiteRequest};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

/// A single test run
///
/// Cloning yields another handle to the same run. Everything happens on one
/// thread: methods that may spawn work (`run`, `evaluate` with deferred
/// values, the idle timeout) must be called inside a tokio `LocalSet`, see
/// [`block_on`](crate::run::block_on).
#[derive(Clone)]
pub struct Harness {
    pub(crate) inner: Rc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) params: RunParams,
    pub(crate) state: RefCell<State>,
    pub(crate) reporter: RefCell<Box<dyn Reporter>>,
    pub(crate) loader: Rc<dyn Loader>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) environment: Environment,
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) counters: Counters,
    /// Assertions started but not yet completed
    pub(crate) depth: usize,
    pub(crate) queue: VecDeque<SuiteRequest>,
    /// A suite is between its queue check and the end of its file loading
    pub(crate) activating: bool,
    pub(crate) active: Option<ActiveSuite>,
    /// Captions of in-flight assertions by case id
    pub(crate) pending: BTreeMap<u64, String>,
    pub(crate) next_case: u64,
}

#[derive(Clone)]
pub(crate) struct ActiveSuite {
    pub(crate) name: String,
    pub(crate) comparator: Option<Comparator>,
    pub(crate) use_timeout: bool,
}

impl Harness {
    /// Harness printing to the console and loading `.test.txt` scripts
    pub fn new(params: RunParams) -> Result<Self> {
        Self::with_parts(params, Box::new(ConsoleReporter::default()), Rc::new(ScriptLoader))
    }

    /// Harness with a custom reporter and loader
    ///
    /// Creates the scratch directory.
    pub fn with_parts(
        params: RunParams,
        reporter: Box<dyn Reporter>,
        loader: Rc<dyn Loader>,
    ) -> Result<Self> {
        let environment = Environment::prepare(&params)?;
        Ok(Harness {
            inner: Rc::new(Inner {
                params,
                state: RefCell::new(State::default()),
                reporter: RefCell::new(reporter),
                loader,
                lifecycle: Lifecycle::new(),
                environment,
            }),
        })
    }

    pub fn params(&self) -> &RunParams {
        &self.inner.params
    }

    pub fn counters(&self) -> Counters {
        self.inner.state.borrow().counters
    }

    /// Number of assertions currently in flight
    pub fn depth(&self) -> usize {
        self.inner.state.borrow().depth
    }

    /// Number of suite requests waiting for the active suite to drain
    pub fn queued(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    /// Name of the suite whose entry point is currently published
    pub fn active_suite(&self) -> Option<String> {
        self.inner.state.borrow().active.as_ref().map(|s| s.name.clone())
    }

    pub fn scratch_dir(&self) -> &Path {
        self.inner.environment.scratch_dir()
    }

    /// Arguments directing spawned workloads to the scratch directory
    pub fn workload_args(&self) -> Vec<String> {
        self.inner.environment.workload_args()
    }

    /// The entry point bound to the active suite, if any suite has activated
    pub fn asserter(&self) -> Option<Asserter> {
        let state = self.inner.state.borrow();
        state.active.as_ref().map(|suite| Asserter {
            harness: self.clone(),
            suite: suite.name.clone(),
            comparator: suite.comparator.clone(),
        })
    }

    /// The no-comparator entry point: passes unless the expression throws or
    /// yields a falsy value
    pub fn assert_success(
        &self,
        caption: impl Into<String>,
        actual: impl Into<Expression>,
    ) -> Result<()> {
        let suite = self.active_suite().unwrap_or_default();
        self.evaluate(&suite, caption, None, actual.into(), None)
    }

    /// True when nothing is in flight, queued or activating
    pub(crate) fn is_quiescent(&self) -> bool {
        let state = self.inner.state.borrow();
        state.depth == 0 && state.queue.is_empty() && !state.activating
    }
}

/// Suite-scoped assertion entry point handed to test files
#[derive(Clone)]
pub struct Asserter {
    harness: Harness,
    suite: String,
    comparator: Option<Comparator>,
}

impl Asserter {
    /// Assert with the suite's comparator
    ///
    /// Without a suite comparator this behaves like [`assert_success`](Self::assert_success)
    /// and `expected` is ignored.
    pub fn assert(
        &self,
        caption: impl Into<String>,
        actual: impl Into<Expression>,
        expected: impl Into<Option<Value>>,
    ) -> Result<()> {
        self.harness.evaluate(
            &self.suite,
            caption,
            self.comparator.clone(),
            actual.into(),
            expected.into(),
        )
    }

    /// Assert that the expression neither throws nor yields a falsy value
    pub fn assert_success(
        &self,
        caption: impl Into<String>,
        actual: impl Into<Expression>,
    ) -> Result<()> {
        self.harness
            .evaluate(&self.suite, caption, None, actual.into(), None)
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn harness(&self) -> &Harness {
        &self.harness
    }
}

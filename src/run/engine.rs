//! Assertion evaluation and completion tracking

use crate::error::{Error, Result};
use crate::outcome::{
    catch_panics, is_truthy, Comparator, Expression, Outcome, Resolved, Thrown, Value, Verdict,
};
use crate::report::CaseReport;
use crate::run::harness::Harness;
use crate::run::params::ThrowPolicy;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// An evaluation between its start and its completion
struct Case {
    id: u64,
    suite: String,
    caption: String,
    expected: Option<Value>,
}

impl Harness {
    /// Evaluate one assertion
    ///
    /// Each call completes exactly once, now or when its deferred value
    /// settles, except when the expression throws while a comparator is
    /// attached under [`ThrowPolicy::Fatal`]: that error is returned and the
    /// case never completes.
    pub fn evaluate(
        &self,
        suite: &str,
        caption: impl Into<String>,
        comparator: Option<Comparator>,
        actual: Expression,
        expected: Option<Value>,
    ) -> Result<()> {
        let case = self.begin(suite, caption.into(), expected);

        match actual.resolve() {
            Err(thrown) => self.settle_thrown(case, comparator.is_some(), thrown, false),
            Ok(Resolved::Ready(value)) => {
                self.judge(case, comparator, value);
                Ok(())
            }
            Ok(Resolved::Deferred(future)) => {
                let harness = self.clone();
                tokio::task::spawn_local(async move {
                    let settled = match catch_panics(future).await {
                        Ok(value) => {
                            harness.judge(case, comparator, value);
                            Ok(())
                        }
                        Err(thrown) => harness.settle_thrown(case, comparator.is_some(), thrown, true),
                    };
                    if let Err(e) = settled {
                        harness.fail(e);
                    }
                });
                Ok(())
            }
        }
    }

    fn begin(&self, suite: &str, caption: String, expected: Option<Value>) -> Case {
        let id = {
            let mut state = self.inner.state.borrow_mut();
            state.depth += 1;
            let id = state.next_case;
            state.next_case += 1;
            state.pending.insert(id, caption.clone());
            id
        };
        tracing::trace!(suite, caption = %caption, "assertion started");
        self.rearm_idle_timeout();
        Case {
            id,
            suite: suite.to_string(),
            caption,
            expected,
        }
    }

    /// Run the comparator, or the truthiness check without one
    fn judge(&self, case: Case, comparator: Option<Comparator>, value: Value) {
        let Some(comparator) = comparator else {
            self.complete(case, is_truthy(&value).into(), Some(value));
            return;
        };

        let verdict = catch_unwind(AssertUnwindSafe(|| comparator(&value, case.expected.as_ref())))
            .map_err(|_| anyhow::anyhow!("comparator panicked"));

        match verdict {
            Ok(Verdict::Ready(outcome)) => self.complete(case, outcome, Some(value)),
            Ok(Verdict::Deferred(future)) => {
                let harness = self.clone();
                tokio::task::spawn_local(async move {
                    match catch_panics(future).await {
                        Ok(outcome) => harness.complete(case, outcome, Some(value)),
                        Err(thrown) => {
                            if let Err(e) = harness.settle_thrown(case, true, thrown, true) {
                                harness.fail(e);
                            }
                        }
                    }
                });
            }
            Err(thrown) => {
                if let Err(e) = self.settle_thrown(case, true, thrown, true) {
                    self.fail(e);
                }
            }
        }
    }

    /// Handle an error thrown by an expression or a comparator
    ///
    /// `settles` is set for errors that surface after the caller has already
    /// returned: on the fatal path the run is ended first, then the case is
    /// completed, so nothing queued starts behind the error.
    fn settle_thrown(
        &self,
        case: Case,
        has_comparator: bool,
        thrown: Thrown,
        settles: bool,
    ) -> Result<()> {
        let description = format!("{:#}", thrown);

        if has_comparator && self.inner.params.throw_policy == ThrowPolicy::Fatal {
            let error = Error::ExpressionThrew {
                caption: case.caption.clone(),
                source: thrown,
            };
            if !settles {
                return Err(error);
            }
            self.fail(error);
        }

        self.complete(case, Outcome::failure_with(description, "no error"), None);
        Ok(())
    }

    /// Report the case, count it and hand over to the next queued suite once
    /// nothing is in flight
    fn complete(&self, case: Case, outcome: Outcome, resolved: Option<Value>) {
        let report = {
            let mut state = self.inner.state.borrow_mut();
            let number = state.counters.total() + 1;
            state.pending.remove(&case.id);
            let (passed, actual, expected) = match outcome {
                Outcome::Success => {
                    state.counters.succeeded += 1;
                    (true, None, None)
                }
                Outcome::Failure { actual, expected } => {
                    state.counters.failed += 1;
                    (false, actual.or(resolved), expected.or(case.expected))
                }
            };
            CaseReport {
                number,
                suite: case.suite,
                caption: case.caption,
                passed,
                expected,
                actual,
            }
        };

        tracing::debug!(
            suite = %report.suite,
            caption = %report.caption,
            passed = report.passed,
            "case {} completed",
            report.number
        );
        self.inner.reporter.borrow_mut().case(&report);

        let next = {
            let mut state = self.inner.state.borrow_mut();
            state.depth -= 1;
            if state.depth == 0 && !state.activating && !self.inner.lifecycle.is_ending() {
                let next = state.queue.pop_front();
                state.activating = next.is_some();
                next
            } else {
                None
            }
        };

        match next {
            Some(request) => self.spawn_activation(request),
            None => self.rearm_idle_timeout(),
        }
        self.inner.lifecycle.wake();
    }
}

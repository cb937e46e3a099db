//! Idle timeout, shutdown handlers and the final summary

use crate::error::Error;
use crate::report::Counters;
use crate::run::harness::Harness;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Exit code of an interrupted run; no summary is printed for it
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Why a run ended
#[derive(Debug)]
pub enum Exit {
    /// Everything drained and no idle timeout was enforced
    Drained,
    /// The idle timeout fired with nothing in flight
    Idle,
    /// SIGINT or SIGTERM
    Interrupted,
    Fatal(Error),
}

/// Result of a finished run
#[derive(Debug)]
pub struct Report {
    pub counters: Counters,
    pub exit: Exit,
}

impl Report {
    pub fn exit_code(&self) -> i32 {
        match self.exit {
            Exit::Interrupted => INTERRUPTED_EXIT_CODE,
            Exit::Fatal(_) => 1,
            Exit::Drained | Exit::Idle if self.counters.failed > 0 => 1,
            Exit::Drained | Exit::Idle => 0,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

type Handler = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Handlers run once at shutdown, in registration order
#[derive(Default)]
pub struct Shutdown {
    handlers: Vec<(String, Handler)>,
}

impl Shutdown {
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.handlers.push((name.into(), Box::new(handler)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run and drop every handler; a failing handler does not stop the rest
    pub fn run(&mut self) {
        for (name, handler) in self.handlers.drain(..) {
            debug!(handler = %name, "running shutdown handler");
            if let Err(e) = handler() {
                warn!(handler = %name, "shutdown handler failed: {:#}", e);
            }
        }
    }
}

pub(crate) struct Lifecycle {
    exit: RefCell<Option<Exit>>,
    /// Set with the first exit reason and never cleared
    ending: Cell<bool>,
    wake: Notify,
    idle_timer: RefCell<Option<JoinHandle<()>>>,
    shutdown: RefCell<Shutdown>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            exit: RefCell::new(None),
            ending: Cell::new(false),
            wake: Notify::new(),
            idle_timer: RefCell::new(None),
            shutdown: RefCell::new(Shutdown::default()),
        }
    }

    /// Record why the run ends; the first reason wins
    pub(crate) fn set_exit(&self, exit: Exit) {
        let mut slot = self.exit.borrow_mut();
        if !self.ending.replace(true) {
            *slot = Some(exit);
        } else {
            debug!("run already ending, ignoring {:?}", exit);
        }
        drop(slot);
        self.wake();
    }

    /// Whether an exit reason was ever recorded; no suite may start after this
    pub(crate) fn is_ending(&self) -> bool {
        self.ending.get()
    }

    pub(crate) fn take_exit(&self) -> Option<Exit> {
        self.exit.borrow_mut().take()
    }

    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.idle_timer.borrow_mut().take() {
            timer.abort();
        }
    }
}

impl Harness {
    /// Restart the idle timer if the active suite enforces it
    ///
    /// Called on every assertion start and completion, so the timer fires
    /// only after a full idle period without progress.
    pub(crate) fn rearm_idle_timeout(&self) {
        let lifecycle = &self.inner.lifecycle;
        lifecycle.cancel_timer();

        let enabled = self
            .inner
            .state
            .borrow()
            .active
            .as_ref()
            .is_some_and(|suite| suite.use_timeout);
        if !enabled || lifecycle.is_ending() {
            return;
        }

        let timeout = self.inner.params.idle_timeout;
        let inner = Rc::downgrade(&self.inner);
        let timer = tokio::task::spawn_local(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                Harness { inner }.idle_timeout_fired();
            }
        });
        *lifecycle.idle_timer.borrow_mut() = Some(timer);
    }

    fn idle_timeout_fired(&self) {
        let exit = {
            let state = self.inner.state.borrow();
            if state.depth == 0 {
                Exit::Idle
            } else {
                Exit::Fatal(Error::IdleStall {
                    suite: state
                        .active
                        .as_ref()
                        .map(|s| s.name.clone())
                        .unwrap_or_default(),
                    pending: state.pending.values().cloned().collect(),
                })
            }
        };
        debug!("idle timeout fired: {:?}", exit);
        self.inner.lifecycle.set_exit(exit);
    }

    /// End the run with a fatal error
    pub fn fail(&self, error: Error) {
        warn!("fatal: {}", error);
        self.inner.lifecycle.set_exit(Exit::Fatal(error));
    }

    /// End the run silently, as on SIGINT
    pub fn interrupt(&self) {
        self.inner.lifecycle.set_exit(Exit::Interrupted);
    }

    /// Register a handler to run once at shutdown
    pub fn on_shutdown<F>(&self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.inner.lifecycle.shutdown.borrow_mut().register(name, handler);
    }

    /// Wait until the run ends
    ///
    /// Without an enforced idle timeout the run ends as soon as nothing is in
    /// flight, queued or activating; with one it ends when the timer fires.
    pub async fn finished(&self) -> Exit {
        loop {
            if let Some(exit) = self.inner.lifecycle.take_exit() {
                return exit;
            }
            let timed = self
                .inner
                .state
                .borrow()
                .active
                .as_ref()
                .is_some_and(|suite| suite.use_timeout);
            if !timed && self.is_quiescent() {
                return Exit::Drained;
            }
            self.inner.lifecycle.wake.notified().await;
        }
    }

    /// Tear the run down and print its summary
    ///
    /// Kills auxiliary processes, runs the shutdown handlers, removes the
    /// scratch directory, then reports: nothing for an interrupted run, the
    /// error for a fatal one, otherwise the ratio line when at least one
    /// assertion completed.
    pub fn shutdown(&self, exit: Exit) -> Report {
        let lifecycle = &self.inner.lifecycle;
        lifecycle.cancel_timer();

        let killed = self.inner.environment.kill_all();
        if killed > 0 {
            debug!("terminated {} auxiliary process(es)", killed);
        }
        lifecycle.shutdown.borrow_mut().run();
        if let Err(e) = self.inner.environment.remove_scratch() {
            warn!("failed to remove scratch directory: {}", e);
        }

        let counters = self.counters();
        let mut reporter = self.inner.reporter.borrow_mut();
        match &exit {
            Exit::Interrupted => {}
            Exit::Fatal(error) => reporter.runtime_error(error),
            Exit::Drained | Exit::Idle if counters.total() > 0 => reporter.summary(counters),
            Exit::Drained | Exit::Idle => {}
        }
        drop(reporter);

        info!(
            succeeded = counters.succeeded,
            failed = counters.failed,
            "run finished: {:?}",
            exit
        );
        Report { counters, exit }
    }
}

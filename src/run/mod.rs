//! Assertion scheduling, suite activation and run lifecycle

pub mod commands;
pub mod engine;
pub mod environment;
pub mod execution;
pub mod harness;
pub mod lifecycle;
pub mod params;
pub mod scheduler;

// Re-export public types
pub use environment::{Phase, ScriptEnv};
pub use execution::{Loader, ScriptLoader};
pub use harness::{Asserter, Harness};
pub use lifecycle::{Exit, Report, Shutdown, INTERRUPTED_EXIT_CODE};
pub use params::{RunParams, SuiteRequest, ThrowPolicy};

use crate::error::Result;
use std::future::Future;
use tokio::task::LocalSet;

/// Drive a future on a fresh current-thread runtime inside a `LocalSet`
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(LocalSet::new().block_on(&runtime, future))
}

impl Harness {
    /// Run the given suites in order and wait for the run to end
    ///
    /// With `handle_signals`, SIGINT and SIGTERM end the run as interrupted.
    pub async fn drive(&self, suites: Vec<SuiteRequest>, handle_signals: bool) -> Exit {
        let work = async {
            for suite in suites {
                if let Err(e) = self.run(suite).await {
                    self.fail(e);
                    break;
                }
            }
            self.finished().await
        };

        if !handle_signals {
            return work.await;
        }

        tokio::select! {
            exit = work => exit,
            _ = interrupted() => {
                self.interrupt();
                self.inner.lifecycle.take_exit().unwrap_or(Exit::Interrupted)
            }
        }
    }
}

async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal support: never resolve
        std::future::pending::<()>().await;
    }
}

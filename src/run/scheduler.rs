//! Suite activation and queueing

use crate::error::{Error, Result};
use crate::run::environment::Phase;
use crate::run::harness::{ActiveSuite, Harness};
use crate::run::params::SuiteRequest;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

impl Harness {
    /// Run a suite, or queue it while another suite is still draining
    ///
    /// Returns once the suite's test files are loaded; deferred assertions
    /// may still be in flight. A queued request returns immediately and is
    /// activated when the in-flight depth returns to zero.
    pub async fn run(&self, request: SuiteRequest) -> Result<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.depth > 0 || state.activating {
                info!(suite = %request.name, depth = state.depth, "suite queued");
                state.queue.push_back(request);
                return Ok(());
            }
            state.activating = true;
        }

        let result = self.activate(request).await;
        self.finish_activation(result.is_ok());
        result
    }

    /// Activate a request that already holds the activation slot
    pub(crate) fn spawn_activation(&self, request: SuiteRequest) {
        let harness = self.clone();
        tokio::task::spawn_local(async move {
            let result = harness.activate(request).await;
            harness.finish_activation(result.is_ok());
            if let Err(e) = result {
                harness.fail(e);
            }
        });
    }

    async fn activate(&self, request: SuiteRequest) -> Result<()> {
        let environment = &self.inner.environment;

        if let Some(setup) = environment.collaborator(&request.name, Phase::Setup) {
            environment.launch_setup(&setup).await?;
        }

        if let Some(cleanup) = environment.collaborator(&request.name, Phase::Cleanup) {
            let mut command = environment.cleanup_command(&cleanup);
            self.on_shutdown(format!("{} cleanup", request.name), move || {
                let status = command.status()?;
                if !status.success() {
                    anyhow::bail!("'{}' exited with {}", cleanup.display(), status);
                }
                Ok(())
            });
        }

        info!(suite = %request.name, path = %request.path.display(), "suite activated");
        self.inner.state.borrow_mut().active = Some(ActiveSuite {
            name: request.name.clone(),
            comparator: request.comparator.clone(),
            use_timeout: request.use_timeout,
        });
        self.inner
            .reporter
            .borrow_mut()
            .suite(&request.name, request.color);
        self.rearm_idle_timeout();

        let asserter = self
            .asserter()
            .ok_or_else(|| Error::Generic("suite entry point was not published".to_string()))?;
        let dir = self.inner.params.base_dir.join(&request.path);
        for file in self.discover(&dir)? {
            debug!(file = %file.display(), "loading test file");
            self.inner
                .loader
                .load(&file, &asserter)
                .map_err(|e| Error::load_error(&file, e))?;
        }

        Ok(())
    }

    /// Release the activation slot and drain the queue if nothing is in flight
    fn finish_activation(&self, succeeded: bool) {
        let next = {
            let mut state = self.inner.state.borrow_mut();
            state.activating = false;
            if succeeded && state.depth == 0 && !self.inner.lifecycle.is_ending() {
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

    /// Test files directly inside `dir`, sorted by name
    fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let regex = Regex::new(&self.inner.params.test_file_pattern)?;

        let mut test_files = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if !entry.file_type().is_file() => None,
                Ok(entry) => entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| regex.is_match(name))
                    .then(|| Ok(entry.into_path())),
                Err(e) => Some(Err(e)),
            })
            .collect::<std::result::Result<Vec<_>, walkdir::Error>>()?;
        test_files.sort();
        Ok(test_files)
    }
}

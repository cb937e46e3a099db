//! Scratch directory, collaborator processes and script variables

use crate::error::{Error, Result};
use crate::parser::TxtarFile;
use crate::run::params::RunParams;
use regex::{Captures, Regex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Which collaborator script of a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => f.write_str("setup"),
            Phase::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Process-level resources of a run
pub(crate) struct Environment {
    base_dir: PathBuf,
    scratch_dir: PathBuf,
    interpreter: String,
    collaborator_ext: String,
    setup_timeout: Duration,
    /// Spawned setup collaborators, killed at shutdown
    processes: RefCell<Vec<Child>>,
}

impl Environment {
    /// Create the scratch directory
    pub(crate) fn prepare(params: &RunParams) -> Result<Self> {
        let scratch_dir = params.scratch_dir();
        fs::create_dir_all(&scratch_dir)?;
        Ok(Environment {
            base_dir: params.base_dir.clone(),
            scratch_dir,
            interpreter: params.interpreter.clone(),
            collaborator_ext: params.collaborator_ext.clone(),
            setup_timeout: params.setup_timeout,
            processes: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub(crate) fn workload_args(&self) -> Vec<String> {
        vec![
            "--path".to_string(),
            self.scratch_dir.to_string_lossy().to_string(),
        ]
    }

    /// `<base>/<suite>.<phase>.<ext>` if it exists
    pub(crate) fn collaborator(&self, suite: &str, phase: Phase) -> Option<PathBuf> {
        let path = self.base_dir.join(format!(
            "{}.{}.{}",
            suite.to_lowercase(),
            phase,
            self.collaborator_ext
        ));
        path.is_file().then_some(path)
    }

    /// Spawn a setup collaborator and wait for its readiness code
    ///
    /// The first stdout line that parses as an integer is the code; if stdout
    /// closes first, the exit code counts. The process keeps running and is
    /// killed at shutdown.
    pub(crate) async fn launch_setup(&self, path: &Path) -> Result<()> {
        info!(target: "minharness::env", collaborator = %path.display(), "+ ENV SETUP");

        let mut child = Command::new(&self.interpreter)
            .arg(path)
            .args(self.workload_args())
            .env("MINHARNESS_SCRATCH", &self.scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (ready_tx, ready_rx) = oneshot::channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::task::spawn_local(forward_stdout(stdout, ready_tx));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::task::spawn_local(forward_stderr(stderr));
        }

        let readiness = tokio::time::timeout(self.setup_timeout, readiness(ready_rx, &mut child)).await;
        self.processes.borrow_mut().push(child);

        let code = readiness.map_err(|_| Error::SetupTimeout {
            path: path.to_path_buf(),
            timeout: self.setup_timeout,
        })??;
        if code != 0 {
            return Err(Error::SetupFailed {
                path: path.to_path_buf(),
                code,
            });
        }

        debug!(collaborator = %path.display(), "setup ready");
        Ok(())
    }

    /// Blocking command for a cleanup collaborator, run at shutdown
    pub(crate) fn cleanup_command(&self, path: &Path) -> std::process::Command {
        let mut command = std::process::Command::new(&self.interpreter);
        command
            .arg(path)
            .args(self.workload_args())
            .env("MINHARNESS_SCRATCH", &self.scratch_dir);
        command
    }

    /// Signal every auxiliary process to terminate, returning how many were signaled
    pub(crate) fn kill_all(&self) -> usize {
        let mut processes = self.processes.borrow_mut();
        let count = processes.len();
        for mut child in processes.drain(..) {
            if let Err(e) = child.start_kill() {
                debug!("auxiliary process already gone: {}", e);
            }
        }
        count
    }

    pub(crate) fn remove_scratch(&self) -> std::io::Result<()> {
        if self.scratch_dir.exists() {
            fs::remove_dir_all(&self.scratch_dir)?;
        }
        Ok(())
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        // Unwinding past a run still removes its scratch state
        let _ = self.remove_scratch();
    }
}

async fn readiness(ready: oneshot::Receiver<i32>, child: &mut Child) -> std::io::Result<i32> {
    match ready.await {
        Ok(code) => Ok(code),
        Err(_) => Ok(child.wait().await?.code().unwrap_or(-1)),
    }
}

async fn forward_stdout(stdout: tokio::process::ChildStdout, ready: oneshot::Sender<i32>) {
    let mut ready = Some(ready);
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if ready.is_some() {
            if let Ok(code) = line.trim().parse::<i32>() {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(code);
                }
                continue;
            }
        }
        info!(target: "minharness::env", "{}", line);
    }
}

async fn forward_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(target: "minharness::env", "{}", line);
    }
}

/// Variables and working directory seen by one test script
pub struct ScriptEnv {
    /// Directory commands run in and file blocks are written to
    pub work_dir: PathBuf,
    pub vars: HashMap<String, String>,
}

impl ScriptEnv {
    pub fn new(work_dir: impl Into<PathBuf>, suite: &str) -> Self {
        let work_dir = work_dir.into();
        let mut vars = HashMap::new();
        vars.insert(
            "SCRATCH".to_string(),
            work_dir.to_string_lossy().to_string(),
        );
        vars.insert("SUITE".to_string(), suite.to_string());
        Self { work_dir, vars }
    }

    /// Write the script's file blocks into the work directory
    pub fn setup_files(&self, files: &[TxtarFile]) -> Result<()> {
        for file in files {
            let file_path = self.work_dir.join(&file.name);
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&file_path, &file.contents)?;
        }
        Ok(())
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Substitute `$VAR` and `${VAR}`; `$$` is a literal `$`
    ///
    /// Unknown variables are left as written.
    pub fn substitute(&self, input: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"\$\$|\$\{(\w+)\}|\$(\w+)").expect("variable pattern is valid")
        });

        pattern
            .replace_all(input, |caps: &Captures| {
                let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
                    return "$".to_string();
                };
                self.vars
                    .get(name.as_str())
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

//! Configuration parameters for a harness run

use crate::outcome::Comparator;
use crate::report::Rgb;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Idle period after which an idle run ends
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Time a setup collaborator has to signal readiness
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens when an expression throws while a comparator is attached
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ThrowPolicy {
    /// The error ends the run
    #[default]
    Fatal,
    /// The error is recorded as a failed case, like without a comparator
    Record,
}

/// A request to run one suite
#[derive(Clone)]
pub struct SuiteRequest {
    /// Directory below the base directory holding the suite's test files
    pub path: PathBuf,
    /// Display name, also used to find collaborator scripts
    pub name: String,
    pub color: Rgb,
    pub comparator: Option<Comparator>,
    /// Whether the idle timeout is enforced while this suite is active
    pub use_timeout: bool,
}

impl SuiteRequest {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            color: [200, 200, 200],
            comparator: None,
            use_timeout: false,
        }
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn use_timeout(mut self, enabled: bool) -> Self {
        self.use_timeout = enabled;
        self
    }
}

impl fmt::Debug for SuiteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteRequest")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("color", &self.color)
            .field("comparator", &self.comparator.is_some())
            .field("use_timeout", &self.use_timeout)
            .finish()
    }
}

/// Configuration parameters for running suites
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Directory holding suite directories and collaborator scripts
    pub base_dir: PathBuf,
    /// Regex a file name must match to be loaded as a test file
    pub test_file_pattern: String,
    pub idle_timeout: Duration,
    pub setup_timeout: Duration,
    /// Program used to run collaborator scripts
    pub interpreter: String,
    /// Extension of collaborator scripts
    pub collaborator_ext: String,
    pub throw_policy: ThrowPolicy,
    /// Named conditions for `[cond]` script prefixes
    pub conditions: HashMap<String, bool>,
}

impl RunParams {
    /// Defaults, with the idle timeout and throw policy taken from the
    /// environment when set
    pub fn new() -> Self {
        let conditions = [
            ("unix", cfg!(unix)),
            ("windows", cfg!(windows)),
            ("linux", cfg!(target_os = "linux")),
            ("macos", cfg!(target_os = "macos")),
            ("debug", cfg!(debug_assertions)),
            ("release", !cfg!(debug_assertions)),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        let idle_timeout = std::env::var("MINHARNESS_IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);

        let throw_policy = match std::env::var("MINHARNESS_RECORD_THROWS") {
            Ok(v) if v == "1" || v.to_lowercase() == "true" => ThrowPolicy::Record,
            _ => ThrowPolicy::Fatal,
        };

        RunParams {
            base_dir: PathBuf::from("test"),
            test_file_pattern: r"\.test\.txt$".to_string(),
            idle_timeout,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            interpreter: "sh".to_string(),
            collaborator_ext: "sh".to_string(),
            throw_policy,
            conditions,
        }
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn test_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.test_file_pattern = pattern.into();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    /// Run collaborators as `<interpreter> <base>/<name>.<phase>.<ext>`
    pub fn collaborators(mut self, interpreter: impl Into<String>, ext: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self.collaborator_ext = ext.into();
        self
    }

    pub fn throw_policy(mut self, policy: ThrowPolicy) -> Self {
        self.throw_policy = policy;
        self
    }

    /// Define or override a script condition
    pub fn condition(mut self, name: &str, value: bool) -> Self {
        self.conditions.insert(name.to_string(), value);
        self
    }

    /// Scratch directory handed to workloads
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_dir.join(".tmp")
    }

    /// Evaluate a script condition such as `unix`, `!windows`, `exec:cat` or `env:CI`
    pub fn check_condition(&self, condition: &str) -> bool {
        let (negated, name) = match condition.strip_prefix('!') {
            Some(name) => (true, name),
            None => (false, condition),
        };

        let value = if let Some(value) = self.conditions.get(name) {
            *value
        } else if let Some(var) = name.strip_prefix("env:") {
            std::env::var(var).is_ok()
        } else if let Some(program) = name.strip_prefix("exec:") {
            program_exists(program)
        } else {
            false
        };

        value != negated
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `program` resolves through `PATH`
fn program_exists(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_file(&dir.join(program)))
}

fn is_file(path: &Path) -> bool {
    path.is_file() || (cfg!(windows) && path.with_extension("exe").is_file())
}

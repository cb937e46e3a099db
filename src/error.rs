//! Error types for minharness

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for harness operations
///
/// Any of these ends a run with exit code 1. A failed assertion is not an
/// error; it is counted and reported as a case.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid test-file pattern
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Suite directory could not be scanned
    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Suite manifest could not be decoded
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Parse error in a test script
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A script producer was used wrongly
    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// Unknown producer in a script expression
    #[error("Unknown producer: {name}")]
    UnknownProducer { name: String },

    /// An assertion expression threw while a comparator was attached
    #[error("Assertion '{caption}' threw: {source:#}")]
    ExpressionThrew {
        caption: String,
        #[source]
        source: anyhow::Error,
    },

    /// The setup collaborator did not signal readiness in time
    #[error("Environmental setup has timed out after {timeout:?} '{}'", path.display())]
    SetupTimeout { path: PathBuf, timeout: Duration },

    /// The setup collaborator signaled a non-zero code
    #[error("Environmental setup terminated with error code {code} '{}'", path.display())]
    SetupFailed { path: PathBuf, code: i32 },

    /// The idle timeout fired while assertions were still pending
    #[error("Test case has timed out in suite '{suite}' (pending: {})", pending.join(", "))]
    IdleStall { suite: String, pending: Vec<String> },

    /// A test file could not be loaded
    #[error("Failed to load '{}': {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Generic(String),

    /// Script error with surrounding line context
    #[error("Error in {script_file} at line {line_num}:\n{context}")]
    ScriptError {
        script_file: String,
        line_num: usize,
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn parse_error(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn command_error(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Attach the script location and its surrounding lines to `source`
    pub fn script_error(
        script_file: impl Into<String>,
        line_num: usize,
        script_content: &str,
        source: Error,
    ) -> Self {
        let context = generate_error_context(script_content, line_num);
        Error::ScriptError {
            script_file: script_file.into(),
            line_num,
            context,
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while loading a test file
    pub fn load_error(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::Load {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Two lines either side of `error_line`, numbered, the failing one marked with `>`
fn generate_error_context(script_content: &str, error_line: usize) -> String {
    let first = error_line.saturating_sub(2).max(1);
    script_content
        .lines()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .skip_while(|(n, _)| *n < first)
        .take_while(|(n, _)| *n <= error_line + 2)
        .map(|(n, text)| {
            let marker = if n == error_line { '>' } else { ' ' };
            format!("{} {} | {}", marker, n, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

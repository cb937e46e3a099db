//! JSON suite manifest
//!
//! ```json
//! [
//!   { "path": "math", "name": "Math", "color": [120, 40, 200], "comparator": "equal" },
//!   { "path": "net", "name": "Net", "timeout": true }
//! ]
//! ```

use crate::error::{Error, Result};
use crate::outcome::comparators;
use crate::report::Rgb;
use crate::run::SuiteRequest;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One suite as written in the manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteEntry {
    pub path: PathBuf,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: Rgb,
    /// Name of a built-in comparator; absent means no comparator
    #[serde(default)]
    pub comparator: Option<String>,
    #[serde(default)]
    pub timeout: bool,
}

fn default_color() -> Rgb {
    [200, 200, 200]
}

impl SuiteEntry {
    pub fn into_request(self) -> Result<SuiteRequest> {
        let comparator = match &self.comparator {
            Some(name) => comparators::by_name(name).ok_or_else(|| {
                Error::Generic(format!(
                    "Unknown comparator '{}' for suite '{}'",
                    name, self.name
                ))
            })?,
            None => None,
        };
        Ok(SuiteRequest {
            path: self.path,
            name: self.name,
            color: self.color,
            comparator,
            use_timeout: self.timeout,
        })
    }
}

/// Parse manifest text into suite requests
pub fn parse(content: &str) -> Result<Vec<SuiteRequest>> {
    let entries: Vec<SuiteEntry> = serde_json::from_str(content)?;
    entries.into_iter().map(SuiteEntry::into_request).collect()
}

/// Read and parse a manifest file
pub fn load(path: &Path) -> Result<Vec<SuiteRequest>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Generic(format!("Cannot read manifest '{}': {}", path.display(), e)))?;
    parse(&content)
}

//! Loading test files into a suite's entry point

use crate::error::{Error, Result};
use crate::parser::Entry;
use crate::run::commands::parse_value;
use crate::run::environment::ScriptEnv;
use crate::run::harness::Asserter;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Turns one test file into assertion calls
///
/// Any error is fatal for the run.
pub trait Loader {
    fn load(&self, path: &Path, asserter: &Asserter) -> Result<()>;
}

impl<F> Loader for F
where
    F: Fn(&Path, &Asserter) -> Result<()>,
{
    fn load(&self, path: &Path, asserter: &Asserter) -> Result<()> {
        self(path, asserter)
    }
}

/// Loader for `.test.txt` scripts
///
/// File blocks are written to the scratch directory, then each entry whose
/// condition holds is handed to the entry point in declaration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptLoader;

impl Loader for ScriptLoader {
    fn load(&self, path: &Path, asserter: &Asserter) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let script_file = path.to_string_lossy().to_string();
        let script = crate::parser::parse(&content).map_err(|e| match e {
            Error::Parse { line, message } => Error::script_error(
                &script_file,
                line,
                &content,
                Error::Parse { line, message },
            ),
            other => other,
        })?;

        let harness = asserter.harness();
        let env = ScriptEnv::new(harness.scratch_dir(), asserter.suite());
        env.setup_files(&script.files)?;

        for assertion in &script.assertions {
            if let Some(condition) = &assertion.condition {
                if !harness.params().check_condition(condition) {
                    debug!(line = assertion.line_num, condition = %condition, "skipping entry");
                    continue;
                }
            }

            let caption = env.substitute(&assertion.caption);
            let result = env.expression(assertion).and_then(|expr| match assertion.entry {
                Entry::Assert => {
                    let expected = assertion
                        .expected
                        .as_deref()
                        .map(|token| parse_value(&env.substitute(token)));
                    asserter.assert(caption, expr, expected)
                }
                Entry::Success => asserter.assert_success(caption, expr),
            });

            result.map_err(|e| Error::script_error(&script_file, assertion.line_num, &content, e))?;
        }

        Ok(())
    }
}

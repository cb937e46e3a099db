//! Expression words of a script line turned into assertion expressions

use crate::error::{Error, Result};
use crate::outcome::{Expression, Thrown, Value};
use crate::parser::Assertion;
use crate::run::environment::ScriptEnv;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

/// Interpret a token as JSON when it parses, otherwise as a plain string
pub fn parse_value(token: &str) -> Value {
    serde_json::from_str(token).unwrap_or_else(|_| Value::String(token.to_string()))
}

impl ScriptEnv {
    /// Build the expression for an assertion line
    ///
    /// - a single word is a literal
    /// - `exec PROG ARGS...` runs a program in the work directory; its trimmed
    ///   stdout is the value and a non-zero exit throws. With a trailing `&`
    ///   the program runs asynchronously.
    /// - `sleep MS [VALUE]` yields VALUE (default `true`) after MS milliseconds
    /// - `fail MESSAGE` throws
    pub fn expression(&self, assertion: &Assertion) -> Result<Expression> {
        let words: Vec<String> = assertion
            .expression
            .iter()
            .map(|w| self.substitute(w))
            .collect();

        match (words[0].as_str(), assertion.deferred) {
            ("exec", deferred) => {
                let (program, args) = match &words[1..] {
                    [program, args @ ..] => (program.clone(), args.to_vec()),
                    [] => return Err(Error::command_error("exec", "no program given")),
                };
                Ok(exec(program, args, self.work_dir.clone(), deferred))
            }
            ("sleep", _) => {
                let millis = words
                    .get(1)
                    .and_then(|w| w.parse::<u64>().ok())
                    .ok_or_else(|| Error::command_error("sleep", "expected milliseconds"))?;
                let value = words.get(2).map(|w| parse_value(w)).unwrap_or(Value::Bool(true));
                Ok(Expression::deferred(async move {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Ok::<_, Thrown>(value)
                }))
            }
            ("fail", false) => {
                let message = words[1..].join(" ");
                Ok(Expression::producer(move || -> std::result::Result<Value, Thrown> {
                    Err(anyhow::anyhow!(message))
                }))
            }
            (name, true) => Err(Error::command_error(
                name,
                "only 'exec' and 'sleep' can be deferred",
            )),
            (literal, false) if words.len() == 1 => Ok(Expression::Literal(parse_value(literal))),
            (name, false) => Err(Error::UnknownProducer {
                name: name.to_string(),
            }),
        }
    }
}

fn exec(program: String, args: Vec<String>, cwd: PathBuf, deferred: bool) -> Expression {
    if deferred {
        return Expression::deferred(async move {
            let output = tokio::process::Command::new(&program)
                .args(&args)
                .current_dir(&cwd)
                .output()
                .await?;
            exec_value(&program, output)
        });
    }

    Expression::producer(move || {
        let output = std::process::Command::new(&program)
            .args(&args)
            .current_dir(&cwd)
            .output()?;
        exec_value(&program, output)
    })
}

fn exec_value(program: &str, output: Output) -> std::result::Result<Value, Thrown> {
    if !output.status.success() {
        anyhow::bail!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    Ok(parse_value(String::from_utf8_lossy(&output.stdout).trim_end()))
}

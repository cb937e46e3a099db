//! Parser for `.test.txt` assertion scripts
//!
//! A script is a txtar-style archive: assertion entries at the top, followed
//! by optional `-- filename --` blocks that are written to the scratch
//! directory before the entries run.

use crate::error::{Error, Result};

/// A `-- name --` block written to the scratch directory before the entries run
#[derive(Debug, Clone, PartialEq)]
pub struct TxtarFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Which assertion entry point a line calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// `assert`: compared with the suite's comparator
    Assert,
    /// `success`: must not throw and must not be falsy
    Success,
}

/// Represents a single assertion line in the script
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub entry: Entry,
    /// Human readable caption (second word)
    pub caption: String,
    /// Expression words: a literal, or a producer such as `exec echo hi`
    pub expression: Vec<String>,
    /// Expected value token after `==`
    pub expected: Option<String>,
    /// 1-based line of the entry, used for error context
    pub line_num: usize,
    /// Optional condition prefix (e.g., "windows", "!unix")
    pub condition: Option<String>,
    /// Whether the expression settles asynchronously (ends with &)
    pub deferred: bool,
}

/// A parsed test file
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Assertions in declaration order
    pub assertions: Vec<Assertion>,
    /// List of files to create in the scratch directory
    pub files: Vec<TxtarFile>,
}

/// Parse a test file
///
/// Everything after the first `-- name --` header belongs to file blocks,
/// blank lines included.
pub fn parse(content: &str) -> Result<Script> {
    let mut assertions = Vec::new();
    let mut files: Vec<TxtarFile> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if let Some(name) = file_header(line) {
            files.push(TxtarFile {
                name: name.to_string(),
                contents: Vec::new(),
            });
            continue;
        }

        match files.last_mut() {
            Some(file) => {
                file.contents.extend_from_slice(line.as_bytes());
                file.contents.push(b'\n');
            }
            None => assertions.extend(parse_assertion_line(line, idx + 1)?),
        }
    }

    // The final line of a block carries no newline of its own
    for file in &mut files {
        if file.contents.last() == Some(&b'\n') {
            file.contents.pop();
        }
    }

    Ok(Script { assertions, files })
}

/// `-- name --` headers; the name must be non-empty
fn file_header(line: &str) -> Option<&str> {
    let name = line.trim().strip_prefix("-- ")?.strip_suffix(" --")?.trim();
    (!name.is_empty()).then_some(name)
}

/// Parse an entry line into an Assertion
fn parse_assertion_line(line: &str, line_num: usize) -> Result<Option<Assertion>> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (condition, entry_part) = match trimmed.strip_prefix('[') {
        Some(rest) => {
            let (condition, rest) = rest
                .split_once(']')
                .ok_or_else(|| Error::parse_error(line_num, "Unclosed condition bracket"))?;
            (Some(condition.to_string()), rest.trim())
        }
        None => (None, trimmed),
    };

    let mut tokens = parse_command_tokens(entry_part)?.into_iter();
    let entry = match tokens.next().as_deref() {
        None => return Ok(None),
        Some("assert") => Entry::Assert,
        Some("success") => Entry::Success,
        Some(other) => {
            return Err(Error::parse_error(
                line_num,
                format!("Unknown entry '{}', expected 'assert' or 'success'", other),
            ))
        }
    };

    let caption = tokens
        .next()
        .ok_or_else(|| Error::parse_error(line_num, "Missing caption"))?;

    let rest: Vec<String> = tokens.collect();
    let (mut expression, expected) = match rest.iter().position(|t| t == "==") {
        Some(pos) => {
            if entry == Entry::Success {
                return Err(Error::parse_error(
                    line_num,
                    "'success' does not take an expected value",
                ));
            }
            let expected = match &rest[pos + 1..] {
                [value] => value.clone(),
                [] => return Err(Error::parse_error(line_num, "'==' requires a value")),
                _ => {
                    return Err(Error::parse_error(
                        line_num,
                        "Expected value must be a single token",
                    ))
                }
            };
            (rest[..pos].to_vec(), Some(expected))
        }
        None => (rest, None),
    };

    // Check for deferred expression (ends with &)
    let deferred = expression.last().is_some_and(|t| t == "&");
    if deferred {
        expression.pop();
    }

    if expression.is_empty() {
        return Err(Error::parse_error(line_num, "Missing expression"));
    }

    Ok(Some(Assertion {
        entry,
        caption,
        expression,
        expected,
        line_num,
        condition,
        deferred,
    }))
}

/// Split a line into words, honouring quotes and backslash escapes
///
/// Quoted empty strings produce empty words. Inside single quotes only
/// `\\`, `\'` and the whitespace escapes are processed.
fn parse_command_tokens(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Some(quote) while inside a quoted section
    let mut quote: Option<char> = None;
    // A quoted section was seen since the last split
    let mut quoted = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match (ch, quote) {
            ('"' | '\'', None) => {
                quote = Some(ch);
                quoted = true;
            }
            (c, Some(q)) if c == q => quote = None,
            (' ' | '\t', None) => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            ('\\', _) => match chars.next() {
                Some(next) => push_escape(&mut current, next, quote == Some('\'')),
                None => current.push('\\'),
            },
            (c, _) => current.push(c),
        }
    }

    if !current.is_empty() || quoted {
        tokens.push(current);
    }

    Ok(tokens)
}

fn push_escape(current: &mut String, next: char, single_quoted: bool) {
    match next {
        'n' => current.push('\n'),
        't' => current.push('\t'),
        'r' => current.push('\r'),
        '\\' | '\'' => current.push(next),
        '"' if !single_quoted => current.push('"'),
        _ => {
            current.push('\\');
            current.push(next);
        }
    }
}

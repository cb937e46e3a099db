#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use minharness::parser::{self, Entry};

#[derive(Arbitrary, Debug)]
struct FuzzScript {
    lines: Vec<FuzzLine>,
    files: Vec<FuzzFile>,
}

#[derive(Arbitrary, Debug)]
struct FuzzLine {
    condition: Option<String>,
    success: bool,
    caption: String,
    expression: Vec<String>,
    deferred: bool,
    expected: Option<String>,
}

#[derive(Arbitrary, Debug)]
struct FuzzFile {
    name: String,
    contents: Vec<u8>,
}

fn quote(word: &str) -> String {
    format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
}

impl FuzzScript {
    fn to_txtar(&self) -> String {
        let mut result = String::new();

        for line in &self.lines {
            if let Some(condition) = &line.condition {
                result.push_str(&format!("[{}] ", condition));
            }
            result.push_str(if line.success { "success" } else { "assert" });
            result.push(' ');
            result.push_str(&quote(&line.caption));
            for word in &line.expression {
                result.push(' ');
                result.push_str(&quote(word));
            }
            if line.deferred {
                result.push_str(" &");
            }
            if let Some(expected) = &line.expected {
                result.push_str(" == ");
                result.push_str(&quote(expected));
            }
            result.push('\n');
        }

        for file in &self.files {
            result.push_str(&format!("-- {} --\n", file.name));
            let content = String::from_utf8_lossy(&file.contents);
            result.push_str(&content);
            if !content.ends_with('\n') {
                result.push('\n');
            }
        }

        result
    }
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(input) = FuzzScript::arbitrary(&mut unstructured) else {
        return;
    };

    let text = input.to_txtar();
    let Ok(script) = parser::parse(&text) else {
        return;
    };

    for assertion in &script.assertions {
        assert!(assertion.line_num > 0);
        assert!(!assertion.expression.is_empty());
        if assertion.entry == Entry::Success {
            assert!(assertion.expected.is_none());
        }
    }
});

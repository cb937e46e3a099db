#![no_main]

use libfuzzer_sys::fuzz_target;
use minharness::parser;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    let Ok(script) = parser::parse(&input) else {
        return;
    };

    for assertion in &script.assertions {
        assert!(!assertion.expression.is_empty(), "Empty expression");
        assert!(assertion.line_num > 0, "Invalid line number");
    }
    for file in &script.files {
        assert!(!file.name.is_empty(), "Empty file name");
    }

    // Same input, same script
    assert_eq!(parser::parse(&input).ok(), Some(script));
});

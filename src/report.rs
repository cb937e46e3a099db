//! Console rendering of suite badges, cases and the final summary

use crate::outcome::Value;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// A display colour for suite badges
pub type Rgb = [u8; 3];

/// Badge colour used for case numbers
const CASE_BADGE: Rgb = [255, 249, 194];

/// Pass/fail counters of one harness
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub succeeded: usize,
    pub failed: usize,
}

impl Counters {
    /// Number of completed evaluations
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// One completed assertion as handed to a reporter
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    /// 1-based number of the case within the run
    pub number: usize,
    pub suite: String,
    pub caption: String,
    pub passed: bool,
    /// Displayed expected value, present for failures only
    pub expected: Option<Value>,
    /// Displayed actual value, present for failures only
    pub actual: Option<Value>,
}

/// Receives everything the harness prints
pub trait Reporter {
    fn suite(&mut self, name: &str, color: Rgb);
    fn case(&mut self, case: &CaseReport);
    fn summary(&mut self, counters: Counters);
    fn runtime_error(&mut self, error: &crate::Error);
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum ColorSetting {
    #[default]
    Automatic,
    Always,
    Never,
}

impl ColorSetting {
    fn choice(self) -> ColorChoice {
        match self {
            ColorSetting::Always => ColorChoice::Always,
            ColorSetting::Never => ColorChoice::Never,
            #[cfg(feature = "colors")]
            ColorSetting::Automatic if atty::is(atty::Stream::Stdout) => ColorChoice::Auto,
            ColorSetting::Automatic => ColorChoice::Never,
        }
    }
}

/// Reporter writing to stdout, summary failures to stderr
pub struct ConsoleReporter {
    out: Box<dyn WriteColor>,
    err: Box<dyn WriteColor>,
}

impl ConsoleReporter {
    pub fn new(color: ColorSetting) -> Self {
        let choice = color.choice();
        Self {
            out: Box::new(StandardStream::stdout(choice)),
            err: Box::new(StandardStream::stderr(choice)),
        }
    }

    /// Reporter over arbitrary writers, used for capturing output
    pub fn with_writers(out: Box<dyn WriteColor>, err: Box<dyn WriteColor>) -> Self {
        Self { out, err }
    }

    fn badge(w: &mut dyn WriteColor, message: &str, color: Rgb, suffix: Option<(bool, &str)>) -> io::Result<()> {
        let mut spec = ColorSpec::new();
        spec.set_bold(true).set_bg(Some(Color::Rgb(color[0], color[1], color[2])));
        // Dark backgrounds get a white foreground
        let sum: u32 = color.iter().map(|&c| c as u32).sum();
        if (sum as f64) < (3.0 * 256.0) / 1.25 {
            spec.set_fg(Some(Color::Rgb(255, 255, 255)));
        }
        w.set_color(&spec)?;
        write!(w, " {} ", message)?;
        w.reset()?;
        if let Some((passed, caption)) = suffix {
            write!(w, " ")?;
            Self::mark(w, passed)?;
            w.set_color(ColorSpec::new().set_dimmed(true))?;
            write!(w, " {}", caption)?;
            w.reset()?;
        }
        writeln!(w)?;
        writeln!(w)
    }

    fn mark(w: &mut dyn WriteColor, passed: bool) -> io::Result<()> {
        let (color, glyph) = if passed {
            (Color::Green, "✓")
        } else {
            (Color::Red, "✗")
        };
        w.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(w, "{}", glyph)?;
        w.reset()
    }

    fn detail(w: &mut dyn WriteColor, label: &str, value: Option<&Value>) -> io::Result<()> {
        w.set_color(
            ColorSpec::new()
                .set_bg(Some(Color::Ansi256(253)))
                .set_fg(Some(Color::Rgb(255, 255, 255))),
        )?;
        write!(w, "   {} ", label)?;
        w.reset()?;
        writeln!(w)?;
        writeln!(w)?;
        let text = match value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        };
        for line in text.lines() {
            writeln!(w, "  {}", line)?;
        }
        writeln!(w)
    }

    fn write_case(&mut self, case: &CaseReport) -> io::Result<()> {
        let w = self.out.as_mut();
        Self::badge(
            w,
            &format!("Case {}", case.number),
            CASE_BADGE,
            Some((case.passed, &case.caption)),
        )?;
        if !case.passed {
            Self::detail(w, "Expected", case.expected.as_ref())?;
            Self::detail(w, "Actual", case.actual.as_ref())?;
        }
        w.flush()
    }

    fn write_summary(&mut self, counters: Counters) -> io::Result<()> {
        let passed = counters.failed == 0;
        let w = if passed { self.out.as_mut() } else { self.err.as_mut() };
        let ratio = format!("({}/{})", counters.succeeded, counters.total());
        w.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(w, "➞  ")?;
        w.reset()?;
        Self::mark(w, passed)?;
        write!(w, " Test run ")?;
        let (color, word) = if passed {
            (Color::Green, "succeeded")
        } else {
            (Color::Red, "failed")
        };
        w.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(w, "{}", word)?;
        w.reset()?;
        writeln!(w, " {}.", ratio)?;
        writeln!(w)?;
        w.flush()
    }

    fn write_runtime_error(&mut self, error: &crate::Error) -> io::Result<()> {
        let w = self.err.as_mut();
        writeln!(w, "{}", error)?;
        writeln!(w)?;
        w.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(w, "➞  ")?;
        w.reset()?;
        Self::mark(w, false)?;
        writeln!(w, " Test run has terminated due to runtime error.")?;
        writeln!(w)?;
        w.flush()
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(ColorSetting::default())
    }
}

impl Reporter for ConsoleReporter {
    fn suite(&mut self, name: &str, color: Rgb) {
        let title = format!("{} Tests", name.to_uppercase());
        if let Err(e) = Self::badge(self.out.as_mut(), &title, color, None) {
            tracing::warn!("failed to write suite badge: {}", e);
        }
    }

    fn case(&mut self, case: &CaseReport) {
        if let Err(e) = self.write_case(case) {
            tracing::warn!("failed to write case {}: {}", case.number, e);
        }
    }

    fn summary(&mut self, counters: Counters) {
        if let Err(e) = self.write_summary(counters) {
            tracing::warn!("failed to write summary: {}", e);
        }
    }

    fn runtime_error(&mut self, error: &crate::Error) {
        if let Err(e) = self.write_runtime_error(error) {
            tracing::warn!("failed to write runtime error: {}", e);
        }
    }
}

/// Something a [`RecordingReporter`] saw
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Suite(String),
    Case(CaseReport),
    Summary(Counters),
    RuntimeError(String),
}

/// Reporter keeping every event in memory
///
/// Clones share the same log, so a clone can be inspected after the original
/// was handed to a harness.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn cases(&self) -> Vec<CaseReport> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Case(case) => Some(case.clone()),
                _ => None,
            })
            .collect()
    }

    /// Captions of completed cases in completion order
    pub fn captions(&self) -> Vec<String> {
        self.cases().into_iter().map(|c| c.caption).collect()
    }
}

impl Reporter for RecordingReporter {
    fn suite(&mut self, name: &str, _color: Rgb) {
        self.events.borrow_mut().push(Event::Suite(name.to_string()));
    }

    fn case(&mut self, case: &CaseReport) {
        self.events.borrow_mut().push(Event::Case(case.clone()));
    }

    fn summary(&mut self, counters: Counters) {
        self.events.borrow_mut().push(Event::Summary(counters));
    }

    fn runtime_error(&mut self, error: &crate::Error) {
        self.events
            .borrow_mut()
            .push(Event::RuntimeError(error.to_string()));
    }
}

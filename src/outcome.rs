//! Values, expressions and the outcomes comparators produce

use futures::future::{FutureExt, LocalBoxFuture};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Dynamic value flowing through assertions
pub type Value = serde_json::Value;

/// Error raised by user code: a producer, a deferred value or a comparator
pub type Thrown = anyhow::Error;

/// A value that resolves later on the harness thread
pub type Deferred<T> = LocalBoxFuture<'static, Result<T, Thrown>>;

/// Result of invoking an expression
pub enum Resolved {
    Ready(Value),
    Deferred(Deferred<Value>),
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Resolved::Ready(value)
    }
}

type Producer = Box<dyn FnOnce() -> Result<Resolved, Thrown>>;

/// The "actual" side of an assertion: a literal or a producer invoked at
/// evaluation time
pub enum Expression {
    Literal(Value),
    Producer(Producer),
}

impl Expression {
    /// A literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// A synchronous producer
    pub fn producer<F, V>(func: F) -> Self
    where
        F: FnOnce() -> Result<V, Thrown> + 'static,
        V: Into<Value>,
    {
        Expression::Producer(Box::new(move || func().map(|v| Resolved::Ready(v.into()))))
    }

    /// A producer whose value settles later
    pub fn deferred<Fut, V>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<V, Thrown>> + 'static,
        V: Into<Value>,
    {
        Expression::Producer(Box::new(move || {
            Ok(Resolved::Deferred(future.map(|r| r.map(Into::into)).boxed_local()))
        }))
    }

    /// Invoke the expression, turning a panic into a thrown error
    pub(crate) fn resolve(self) -> Result<Resolved, Thrown> {
        match self {
            Expression::Literal(value) => Ok(Resolved::Ready(value)),
            Expression::Producer(func) => match catch_unwind(AssertUnwindSafe(func)) {
                Ok(result) => result,
                Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload))),
            },
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Expression {
            fn from(value: $ty) -> Self {
                Expression::Literal(value.into())
            }
        })*
    };
}

literal_from!(bool, i64, u64, f64, &str, String);

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Expression::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Turn a panic while polling `future` into a thrown error
pub(crate) fn catch_panics<T: 'static>(future: Deferred<T>) -> Deferred<T> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .map(|result| {
            result.unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(payload))))
        })
        .boxed_local()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|payload| payload.downcast::<String>().map(|s| *s))
        .unwrap_or_else(|_| String::from("non-string panic payload"))
}

/// Outcome of one assertion
///
/// A failure may carry the values to display in place of the raw actual and
/// expected values, e.g. a pretty-printed diff.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    Failure {
        actual: Option<Value>,
        expected: Option<Value>,
    },
}

impl Outcome {
    /// A failure that displays the raw values
    pub fn failure() -> Self {
        Outcome::Failure {
            actual: None,
            expected: None,
        }
    }

    /// A failure that displays the given values instead of the raw ones
    pub fn failure_with(actual: impl Into<Value>, expected: impl Into<Value>) -> Self {
        Outcome::Failure {
            actual: Some(actual.into()),
            expected: Some(expected.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl From<bool> for Outcome {
    fn from(passed: bool) -> Self {
        if passed {
            Outcome::Success
        } else {
            Outcome::failure()
        }
    }
}

/// What a comparator hands back: an outcome now or one later
pub enum Verdict {
    Ready(Outcome),
    Deferred(Deferred<Outcome>),
}

impl Verdict {
    /// Wrap a future outcome
    pub fn deferred<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<Outcome, Thrown>> + 'static,
    {
        Verdict::Deferred(future.boxed_local())
    }
}

impl From<Outcome> for Verdict {
    fn from(outcome: Outcome) -> Self {
        Verdict::Ready(outcome)
    }
}

impl From<bool> for Verdict {
    fn from(passed: bool) -> Self {
        Verdict::Ready(passed.into())
    }
}

/// Pluggable "equals" semantics shared by a suite's assertions
pub type Comparator = Rc<dyn Fn(&Value, Option<&Value>) -> Verdict>;

/// Truthiness used when an assertion has no comparator
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Built-in comparators
pub mod comparators {
    use super::*;

    /// Strict equality of the two values
    pub fn equal() -> Comparator {
        Rc::new(|actual: &Value, expected: Option<&Value>| -> Verdict {
            (Some(actual) == expected).into()
        })
    }

    /// Equality of the values' string forms, so `2` equals `"2"`
    pub fn loose() -> Comparator {
        Rc::new(|actual: &Value, expected: Option<&Value>| -> Verdict {
            let expected = expected.map(plain_string).unwrap_or_default();
            (plain_string(actual) == expected).into()
        })
    }

    /// Strict equality that shows both sides pretty-printed on failure
    pub fn json() -> Comparator {
        Rc::new(|actual: &Value, expected: Option<&Value>| -> Verdict {
            if Some(actual) == expected {
                return Outcome::Success.into();
            }
            let pretty = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string());
            Outcome::failure_with(
                pretty(actual),
                expected.map(pretty).unwrap_or_else(|| "undefined".to_string()),
            )
            .into()
        })
    }

    /// Look up a built-in comparator by name; `none` means no comparator
    pub fn by_name(name: &str) -> Option<Option<Comparator>> {
        match name {
            "equal" => Some(Some(equal())),
            "loose" => Some(Some(loose())),
            "json" => Some(Some(json())),
            "none" => Some(None),
            _ => None,
        }
    }

    fn plain_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

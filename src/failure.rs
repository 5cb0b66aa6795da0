//! Failure values raised by test code
//!
//! Test bodies report failures either by returning `Err(TestFailure)` or by
//! panicking (e.g. `assert!`). Both end up as a `TestFailure` once the runner
//! has caught them.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A failure raised by a test body, setup or teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub message: String,
    /// True when the failure was caught from a panic rather than returned
    pub panicked: bool,
}

impl TestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panicked: false,
        }
    }

    /// Build a failure from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test panicked with a non-string payload".to_string()
        };
        Self {
            message,
            panicked: true,
        }
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "panicked: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for TestFailure {}

/// Fail the current test unless `condition` holds
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), TestFailure> {
    if condition {
        Ok(())
    } else {
        Err(TestFailure::new(message))
    }
}

/// Run `f`, turning a panic into a failure
pub fn guard<T>(f: impl FnOnce() -> Result<T, TestFailure>) -> Result<T, TestFailure> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TestFailure::from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_payloads() {
        let str_payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(TestFailure::from_panic(str_payload).message, "boom");

        let string_payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let failure = TestFailure::from_panic(string_payload);
        assert_eq!(failure.message, "owned boom");
        assert!(failure.panicked);
        assert_eq!(failure.to_string(), "panicked: owned boom");
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, "unused").is_ok());
        assert_eq!(ensure(false, "button missing").unwrap_err().message, "button missing");
    }

    #[test]
    fn test_guard_catches_panics() {
        assert_eq!(guard(|| Ok(3)), Ok(3));
        let failure = guard::<()>(|| panic!("slider stuck")).unwrap_err();
        assert!(failure.panicked);
        assert_eq!(failure.message, "slider stuck");
    }
}

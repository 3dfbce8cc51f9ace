//! Structured verdicts produced by the execution verifier.

use serde::{Deserialize, Serialize};

/// Classification of a single verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Combined program ran to completion with no uncaught exception.
    Passed,
    /// An assertion failed while the tests ran.
    Failed,
    /// The deadline expired and the interpreter was killed.
    TimedOut,
    /// A runtime exception other than an assertion failure was raised.
    ExecutionError,
    /// The combined program did not parse; no statement was executed.
    SyntaxError,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::TimedOut => "timed_out",
            Outcome::ExecutionError => "execution_error",
            Outcome::SyntaxError => "syntax_error",
        };
        write!(f, "{s}")
    }
}

/// Result of verifying one candidate against one test suite.
///
/// `failing_line` and `failing_statement` use combined-program coordinates
/// (candidate first, one blank line, then tests) and are only populated when
/// the failure point lies inside the combined program text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub message: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_kind: Option<String>,
}

impl Verdict {
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            failing_line: None,
            failing_statement: None,
            exception_kind: None,
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_location(mut self, line: usize, statement: Option<String>) -> Self {
        self.failing_line = Some(line);
        self.failing_statement = statement;
        self
    }

    pub fn with_exception_kind(mut self, kind: impl Into<String>) -> Self {
        self.exception_kind = Some(kind.into());
        self
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Why a single test case failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The submission does not define the function under test
    EntryPointNotFound,
    /// The source failed to compile or raised at module level
    LoadError,
    /// The call raised
    RuntimeError,
    /// The execution budget was exhausted and the executor was killed
    RunawayExecution,
    /// Ran to completion but returned the wrong value
    OutputMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::EntryPointNotFound => "entry_point_not_found",
            ErrorKind::LoadError => "load_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::RunawayExecution => "runaway_execution",
            ErrorKind::OutputMismatch => "output_mismatch",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub input: Value,
    pub expected: Value,
    /// Value produced by the submission (null when nothing was returned)
    pub actual: Value,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Output the submission printed while running this case
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default)]
    pub time_ms: u32,
}

impl CaseResult {
    pub fn passed(input: Value, expected: Value, actual: Value) -> Self {
        Self {
            input,
            expected,
            actual,
            passed: true,
            error: None,
            kind: None,
            stdout: String::new(),
            time_ms: 0,
        }
    }

    pub fn failed(
        input: Value,
        expected: Value,
        kind: ErrorKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            input,
            expected,
            actual: Value::Null,
            passed: false,
            error: Some(error.into()),
            kind: Some(kind),
            stdout: String::new(),
            time_ms: 0,
        }
    }

    pub fn with_actual(mut self, actual: Value) -> Self {
        self.actual = actual;
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_time_ms(mut self, time_ms: u32) -> Self {
        self.time_ms = time_ms;
        self
    }
}

/// Aggregate grading result for one submission.
///
/// `passed + errors == total == details.len()` always holds, and `details`
/// follows the order of the test cases that were graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: usize,
    pub total: usize,
    pub errors: usize,
    pub details: Vec<CaseResult>,
}

impl Verdict {
    pub fn from_details(details: Vec<CaseResult>) -> Self {
        let total = details.len();
        let passed = details.iter().filter(|d| d.passed).count();
        Self {
            passed,
            total,
            errors: total - passed,
            details,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.errors == 0
    }

    /// The first failure kind in test-case order, if any
    pub fn first_error_kind(&self) -> Option<ErrorKind> {
        self.details.iter().find_map(|d| d.kind)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single call-and-compare test against a submitted function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Entry point to invoke. When absent the grader infers it from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Positional arguments
    #[serde(default)]
    pub input: Vec<Value>,
    /// Expected return value
    pub expected: Value,
}

impl TestCase {
    pub fn new(input: Vec<Value>, expected: Value) -> Self {
        Self {
            function: None,
            input,
            expected,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// A script-style test: feed `input` on stdin, compare stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
}

impl StdioCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            name: None,
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

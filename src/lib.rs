//! Grading engine for head-to-head coding matches.
//!
//! A submission is graded by running it once per test case in a fresh,
//! resource-limited interpreter process and comparing the returned value with
//! the expected one. See [`Grader`] for the engine and [`grade`] for the
//! one-call entry point.

pub mod challenges;
pub mod core;
pub mod grader;
pub mod harness;
pub mod jobs;
pub mod outcome;
pub mod redis_manager;
pub mod runner;
pub mod sandbox;

pub use crate::challenges::{Catalog, Challenge, Difficulty};
pub use crate::core::{values_equal, CaseResult, ErrorKind, StdioCase, TestCase, Verdict};
pub use crate::grader::{infer_entry_point, GradeError, Grader};
pub use crate::outcome::{decide_winner, Standing, Winner};
pub use crate::sandbox::SandboxConfig;

/// Grade `source` against `cases` with the default configuration
pub async fn grade(source: &str, cases: &[TestCase]) -> Result<Verdict, GradeError> {
    Grader::default().grade(source, cases).await
}

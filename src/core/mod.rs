//! Core grading types shared by the engine, the catalog and the worker jobs.

pub mod testcase;
pub mod utils;
pub mod value;
pub mod verdict;

pub use testcase::{StdioCase, TestCase};
pub use value::values_equal;
pub use verdict::{CaseResult, ErrorKind, Verdict};

//! Call harness and its wire protocol
//!
//! The harness is a small Python program written into each workspace. It
//! receives one [`HarnessRequest`] as JSON on stdin, runs the submission in a
//! fresh namespace with its printed output captured, and answers with one
//! [`HarnessReply`] line on stdout. Expected values never cross this channel.
//!
//! The submission shares the process, so it could print something shaped like
//! a reply. The harness moves its own reply stream off descriptor 1 before the
//! submission runs, and every reply must echo the request's random token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Harness source, embedded at build time
pub const HARNESS_SCRIPT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/harness.py"));

/// File name the harness is written to inside a workspace
pub const HARNESS_FILE: &str = "harness.py";

/// Interpreter flags: isolated mode, no bytecode files, UTF-8 stdio
pub const PYTHON_FLAGS: [&str; 4] = ["-I", "-B", "-X", "utf8"];

#[derive(Debug, Serialize)]
pub struct HarnessRequest<'a> {
    pub source: &'a str,
    pub function: &'a str,
    pub args: &'a [Value],
    /// Characters of captured output to send back
    pub stdout_limit: usize,
    /// Echoed in every genuine reply
    pub token: &'a str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HarnessReply {
    /// The call returned a JSON-representable value
    Ok {
        value: Value,
        #[serde(default)]
        stdout: String,
    },
    /// The call returned something JSON cannot carry (sets, NaN, objects)
    Unserializable {
        repr: String,
        #[serde(default)]
        stdout: String,
    },
    LoadError {
        message: String,
    },
    EntryPointNotFound {
        message: String,
    },
    RuntimeError {
        message: String,
        #[serde(default)]
        stdout: String,
    },
}

/// Fresh token for one request
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Find the reply in the harness's stdout: the last JSON line carrying `token`
pub fn parse_reply(stdout: &str, token: &str) -> Option<HarnessReply> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|line| line.get("token").and_then(Value::as_str) == Some(token))?;
    serde_json::from_value(line).ok()
}

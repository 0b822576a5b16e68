//! Runner module - Execution abstraction layer
//!
//! A runner starts one program in its own isolation context, feeds it stdin,
//! enforces the run limits and reports what happened. It does NOT:
//! - Interpret the program's output
//! - Compare values or decide verdicts
//! - Know which test case it is running

pub mod sandboxed;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Environment variables (key=value). The child sees nothing else.
    pub env: Vec<String>,
    /// Working directory. A sandboxed run under a borrowed uid takes
    /// ownership of it, so it must be a scratch directory.
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_env(mut self, env: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env = env.into_iter().map(|e| e.into()).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Environment as (key, value) pairs; malformed entries are skipped
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|e| e.split_once('='))
    }
}

/// Resource limits for one execution
#[derive(Debug, Clone, PartialEq)]
pub struct RunLimits {
    /// Wall-clock limit in milliseconds
    pub time_ms: u32,
    /// Address space limit in MB (0 = unlimited)
    pub memory_mb: u32,
    /// Largest file the program may write, in KB
    pub file_size_kb: u32,
    /// Maximum open file descriptors
    pub open_files: u32,
    /// Processes the program may create (only enforced for non-root users)
    pub processes: u32,
    /// Bytes kept from each of stdout and stderr
    pub output_bytes: usize,
    /// Run inside fresh user and network namespaces
    pub isolate_network: bool,
}

impl RunLimits {
    pub fn new(time_ms: u32, memory_mb: u32) -> Self {
        Self {
            time_ms,
            memory_mb,
            ..Self::default()
        }
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            time_ms: 3000,
            memory_mb: 512,
            file_size_kb: 0,
            open_files: 64,
            processes: 0,
            output_bytes: 1024 * 1024,
            isolate_network: false,
        }
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Wall-clock limit exceeded; the process group was killed
    TimeLimitExceeded,
    /// Killed by signal
    Signaled(i32),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Wall time in milliseconds
    pub time_ms: u32,
    /// Stdout content
    pub stdout: String,
    /// Stderr content
    pub stderr: String,
    /// Whether stdout or stderr was cut at the output limit
    pub truncated: bool,
    /// Execution status
    pub status: RunStatus,
}

impl RunOutcome {
    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin.
    ///
    /// An `Err` means the isolation context itself could not be set up
    /// (spawn failure, pipe failure); anything the program does is reported
    /// through `RunOutcome`.
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome>;
}

// Re-exports
pub use sandboxed::SandboxedRunner;

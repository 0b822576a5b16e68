//! Sandbox configuration
//!
//! Interpreter and resource limits for the grading engine. Values come from
//! built-in defaults, an optional TOML file, and `GRADER_*` environment
//! variables, in increasing order of precedence.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::runner::RunLimits;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter used to run submissions (default: "python3")
    pub python: String,
    /// Wall-clock budget per test case in milliseconds (default: 3000)
    pub time_limit_ms: u32,
    /// Address space limit in MB (default: 512, 0 = unlimited)
    pub memory_limit_mb: u32,
    /// Largest file a submission may write, in KB (default: 0)
    pub file_size_kb: u32,
    /// Open file descriptors (default: 64)
    pub open_files: u32,
    /// Extra processes a submission may create (default: 0)
    pub processes: u32,
    /// Captured stdout kept per test case (default: 64 KiB)
    pub max_output_bytes: usize,
    /// Largest accepted source (default: 64 KiB)
    pub max_source_bytes: usize,
    /// Run each execution in fresh user + network namespaces (default: false)
    pub isolate_network: bool,
    /// First uid lent to submissions when the worker runs as root (default: 61000)
    pub sandbox_uid_base: u32,
    /// Number of uids lent out at once (default: 64)
    pub sandbox_uids: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            time_limit_ms: 3000,
            memory_limit_mb: 512,
            file_size_kb: 0,
            open_files: 64,
            processes: 0,
            max_output_bytes: 64 * 1024,
            max_source_bytes: 64 * 1024,
            isolate_network: false,
            sandbox_uid_base: 61000,
            sandbox_uids: 64,
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `GRADER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sandbox config {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid sandbox config {:?}", path))?;
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        }

        if let Some(v) = lookup("GRADER_PYTHON") {
            self.python = v;
        }
        if let Some(v) = lookup("GRADER_TIME_LIMIT_MS") {
            self.time_limit_ms = parse("GRADER_TIME_LIMIT_MS", &v)?;
        }
        if let Some(v) = lookup("GRADER_MEMORY_LIMIT_MB") {
            self.memory_limit_mb = parse("GRADER_MEMORY_LIMIT_MB", &v)?;
        }
        if let Some(v) = lookup("GRADER_FILE_SIZE_KB") {
            self.file_size_kb = parse("GRADER_FILE_SIZE_KB", &v)?;
        }
        if let Some(v) = lookup("GRADER_MAX_OUTPUT_BYTES") {
            self.max_output_bytes = parse("GRADER_MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = lookup("GRADER_MAX_SOURCE_BYTES") {
            self.max_source_bytes = parse("GRADER_MAX_SOURCE_BYTES", &v)?;
        }
        if let Some(v) = lookup("GRADER_ISOLATE_NETWORK") {
            self.isolate_network = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(v) = lookup("GRADER_SANDBOX_UID_BASE") {
            self.sandbox_uid_base = parse("GRADER_SANDBOX_UID_BASE", &v)?;
        }
        if let Some(v) = lookup("GRADER_SANDBOX_UIDS") {
            self.sandbox_uids = parse("GRADER_SANDBOX_UIDS", &v)?;
        }

        if self.time_limit_ms == 0 {
            anyhow::bail!("time_limit_ms must be greater than zero");
        }
        if self.sandbox_uid_base == 0 || self.sandbox_uids == 0 {
            anyhow::bail!("sandbox_uid_base and sandbox_uids must be greater than zero");
        }

        Ok(self)
    }

    /// Limits for one test case execution.
    ///
    /// The pipe cap leaves room for the JSON envelope around captured output
    /// and the returned value.
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            time_ms: self.time_limit_ms,
            memory_mb: self.memory_limit_mb,
            file_size_kb: self.file_size_kb,
            open_files: self.open_files,
            processes: self.processes,
            output_bytes: self.max_output_bytes.saturating_mul(8).max(1024 * 1024),
            isolate_network: self.isolate_network,
        }
    }
}

//! Grading engine
//!
//! Runs a submission against test cases, one isolated interpreter process per
//! case, and turns each raw run into a [`CaseResult`]. Only failures to set up
//! the isolation context escape as [`GradeError`]; everything the submission
//! does is graded.

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{
    utils::{last_line, truncate_chars},
    values_equal, CaseResult, ErrorKind, StdioCase, TestCase, Verdict,
};
use crate::harness::{
    new_token, parse_reply, HarnessReply, HarnessRequest, HARNESS_FILE, HARNESS_SCRIPT,
    PYTHON_FLAGS,
};
use crate::runner::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner, SandboxedRunner};
use crate::sandbox::{SandboxConfig, Workspace};

/// File the whole submission is written to for stdin/stdout checks
const SUBMISSION_FILE: &str = "submission.py";

/// Longest error message kept from stderr
const MAX_ERROR_CHARS: usize = 500;

const NO_ENTRY_POINT: &str = "Could not determine function name from code";
const OUTPUT_MISMATCH: &str = "Output mismatch";

/// Failure to grade at all, distinct from a verdict with failed cases
#[derive(Error, Debug)]
pub enum GradeError {
    /// Scratch directory or harness file could not be prepared
    #[error("Failed to prepare isolation context: {0}")]
    Workspace(String),

    /// Interpreter could not be started or supervised
    #[error("Failed to start interpreter: {0}")]
    Spawn(String),

    #[error("Failed to encode harness request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Name of the first function defined in `source`
pub fn infer_entry_point(source: &str) -> Option<&str> {
    static DEF: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DEF
        .get_or_init(|| Regex::new(r"def\s+(\w+)\s*\(").ok())
        .as_ref()?;
    re.captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Grading engine. Cheap to share; every call builds its own isolation contexts.
pub struct Grader {
    config: SandboxConfig,
    runner: Arc<dyn Runner>,
}

impl Default for Grader {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl Grader {
    pub fn new(config: SandboxConfig) -> Self {
        let runner = SandboxedRunner::from_config(&config);
        Self::with_runner(config, Arc::new(runner))
    }

    pub fn with_runner(config: SandboxConfig, runner: Arc<dyn Runner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Call the submission's entry point once per test case and compare results.
    ///
    /// Details come back in test-case order.
    pub async fn grade(&self, source: &str, cases: &[TestCase]) -> Result<Verdict, GradeError> {
        let started = Instant::now();
        let inferred = infer_entry_point(source);
        let oversized = self.oversized_message(source);

        let mut details = Vec::with_capacity(cases.len());
        for (idx, case) in cases.iter().enumerate() {
            let input = Value::Array(case.input.clone());
            let expected = case.expected.clone();

            let detail = if let Some(message) = &oversized {
                CaseResult::failed(input, expected, ErrorKind::LoadError, message.clone())
            } else {
                match case.function.as_deref().or(inferred) {
                    Some(function) => self.run_call(source, function, case).await?,
                    None => CaseResult::failed(
                        input,
                        expected,
                        ErrorKind::EntryPointNotFound,
                        NO_ENTRY_POINT,
                    ),
                }
            };

            debug!(
                "Test case {}: passed={} kind={:?} ({} ms)",
                idx + 1,
                detail.passed,
                detail.kind,
                detail.time_ms
            );
            details.push(detail);
        }

        let verdict = Verdict::from_details(details);
        info!(
            "Graded submission: {}/{} passed in {} ms",
            verdict.passed,
            verdict.total,
            started.elapsed().as_millis()
        );
        Ok(verdict)
    }

    /// Run the submission as a script per case, feeding `input` on stdin and
    /// comparing trimmed stdout.
    pub async fn grade_stdio(
        &self,
        source: &str,
        cases: &[StdioCase],
    ) -> Result<Verdict, GradeError> {
        let started = Instant::now();
        let oversized = self.oversized_message(source);

        let mut details = Vec::with_capacity(cases.len());
        for (idx, case) in cases.iter().enumerate() {
            let detail = match &oversized {
                Some(message) => CaseResult::failed(
                    Value::String(case.input.clone()),
                    Value::String(case.expected_output.clone()),
                    ErrorKind::LoadError,
                    message.clone(),
                ),
                None => self.run_script(source, case).await?,
            };

            debug!(
                "Stdio case {} ({}): passed={} kind={:?}",
                idx + 1,
                case.name.as_deref().unwrap_or("unnamed"),
                detail.passed,
                detail.kind
            );
            details.push(detail);
        }

        let verdict = Verdict::from_details(details);
        info!(
            "Graded stdio submission: {}/{} passed in {} ms",
            verdict.passed,
            verdict.total,
            started.elapsed().as_millis()
        );
        Ok(verdict)
    }

    fn oversized_message(&self, source: &str) -> Option<String> {
        (source.len() > self.config.max_source_bytes).then(|| {
            format!(
                "Source is {} bytes, limit is {} bytes",
                source.len(),
                self.config.max_source_bytes
            )
        })
    }

    async fn run_call(
        &self,
        source: &str,
        function: &str,
        case: &TestCase,
    ) -> Result<CaseResult, GradeError> {
        let workspace = self.prepare_workspace(HARNESS_FILE, HARNESS_SCRIPT).await?;
        let token = new_token();
        let request = serde_json::to_string(&HarnessRequest {
            source,
            function,
            args: &case.input,
            stdout_limit: self.config.max_output_bytes,
            token: &token,
        })?;

        let cmd = self.interpreter_command(&workspace, HARNESS_FILE);
        let outcome = self.execute(&cmd, &self.config.limits(), &request).await?;
        Ok(self.classify_call(case, outcome, &token))
    }

    async fn run_script(&self, source: &str, case: &StdioCase) -> Result<CaseResult, GradeError> {
        let workspace = self.prepare_workspace(SUBMISSION_FILE, source).await?;
        let limits = RunLimits {
            output_bytes: self.config.max_output_bytes,
            ..self.config.limits()
        };

        let cmd = self.interpreter_command(&workspace, SUBMISSION_FILE);
        let outcome = self.execute(&cmd, &limits, &case.input).await?;
        Ok(self.classify_script(case, outcome))
    }

    async fn prepare_workspace(&self, file: &str, content: &str) -> Result<Workspace, GradeError> {
        let workspace = Workspace::create().map_err(|e| {
            warn!("Workspace creation failed: {:#}", e);
            GradeError::Workspace(format!("{:#}", e))
        })?;
        workspace
            .write_file(file, content)
            .await
            .map_err(|e| GradeError::Workspace(format!("{:#}", e)))?;
        Ok(workspace)
    }

    async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: &str,
    ) -> Result<RunOutcome, GradeError> {
        self.runner.run(cmd, limits, Some(stdin)).await.map_err(|e| {
            warn!("Interpreter run failed: {:#}", e);
            GradeError::Spawn(format!("{:#}", e))
        })
    }

    fn interpreter_command(&self, workspace: &Workspace, script: &str) -> CommandSpec {
        let args = PYTHON_FLAGS
            .iter()
            .map(|flag| flag.to_string())
            .chain(std::iter::once(script.to_string()));

        CommandSpec::new(self.config.python.as_str())
            .with_args(args)
            .with_env([
                "PATH=/usr/local/bin:/usr/bin:/bin".to_string(),
                format!("HOME={}", workspace.path().display()),
                "LANG=C.UTF-8".to_string(),
            ])
            .with_work_dir(workspace.path())
    }

    fn classify_call(&self, case: &TestCase, outcome: RunOutcome, token: &str) -> CaseResult {
        let input = Value::Array(case.input.clone());
        let expected = case.expected.clone();

        let result = if outcome.status == RunStatus::TimeLimitExceeded {
            let message = self.runaway_message();
            CaseResult::failed(input, expected, ErrorKind::RunawayExecution, message)
        } else if let Some(reply) = parse_reply(&outcome.stdout, token) {
            match reply {
                HarnessReply::Ok { value, stdout } => {
                    let graded = if values_equal(&value, &expected) {
                        CaseResult::passed(input, expected, value)
                    } else {
                        CaseResult::failed(
                            input,
                            expected,
                            ErrorKind::OutputMismatch,
                            OUTPUT_MISMATCH,
                        )
                        .with_actual(value)
                    };
                    graded.with_stdout(stdout)
                }
                HarnessReply::Unserializable { repr, stdout } => {
                    CaseResult::failed(input, expected, ErrorKind::OutputMismatch, OUTPUT_MISMATCH)
                        .with_actual(Value::String(repr))
                        .with_stdout(stdout)
                }
                HarnessReply::LoadError { message } => {
                    CaseResult::failed(input, expected, ErrorKind::LoadError, message)
                }
                HarnessReply::EntryPointNotFound { message } => {
                    CaseResult::failed(input, expected, ErrorKind::EntryPointNotFound, message)
                }
                HarnessReply::RuntimeError { message, stdout } => {
                    CaseResult::failed(input, expected, ErrorKind::RuntimeError, message)
                        .with_stdout(stdout)
                }
            }
        } else if is_runaway_signal(&outcome.status) {
            CaseResult::failed(input, expected, ErrorKind::RunawayExecution, self.runaway_message())
        } else {
            let message = abnormal_exit_message(&outcome);
            CaseResult::failed(input, expected, ErrorKind::RuntimeError, message)
        };

        result.with_time_ms(outcome.time_ms)
    }

    fn classify_script(&self, case: &StdioCase, outcome: RunOutcome) -> CaseResult {
        let input = Value::String(case.input.clone());
        let expected_text = case.expected_output.trim();
        let expected = Value::String(case.expected_output.clone());

        let result = match &outcome.status {
            status if *status == RunStatus::TimeLimitExceeded || is_runaway_signal(status) => {
                let message = self.runaway_message();
                CaseResult::failed(input, expected, ErrorKind::RunawayExecution, message)
            }
            RunStatus::Exited(0) => {
                let actual = outcome.stdout.trim();
                if outcome.truncated {
                    CaseResult::failed(
                        input,
                        expected,
                        ErrorKind::OutputMismatch,
                        format!("Output exceeded {} bytes", self.config.max_output_bytes),
                    )
                    .with_actual(Value::String(actual.to_string()))
                } else if actual == expected_text {
                    CaseResult::passed(input, expected, Value::String(actual.to_string()))
                } else {
                    CaseResult::failed(input, expected, ErrorKind::OutputMismatch, OUTPUT_MISMATCH)
                        .with_actual(Value::String(actual.to_string()))
                }
            }
            _ => {
                let message = abnormal_exit_message(&outcome);
                let kind = if is_compile_error(&message) {
                    ErrorKind::LoadError
                } else {
                    ErrorKind::RuntimeError
                };
                CaseResult::failed(input, expected, kind, message)
                    .with_actual(Value::String(outcome.stdout.trim().to_string()))
            }
        };

        result.with_time_ms(outcome.time_ms)
    }

    fn runaway_message(&self) -> String {
        format!(
            "Execution exceeded allowed time ({} ms)",
            self.config.time_limit_ms
        )
    }
}

/// The CPU rlimit fired. Other kills (the OOM killer's SIGKILL among them)
/// are not a time overrun.
fn is_runaway_signal(status: &RunStatus) -> bool {
    const SIGXCPU: i32 = nix::sys::signal::Signal::SIGXCPU as i32;
    matches!(status, RunStatus::Signaled(SIGXCPU))
}

fn is_compile_error(message: &str) -> bool {
    ["SyntaxError", "IndentationError", "TabError"]
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

fn abnormal_exit_message(outcome: &RunOutcome) -> String {
    if outcome.truncated {
        return "Output limit exceeded".to_string();
    }
    if let Some(line) = last_line(&outcome.stderr) {
        return truncate_chars(line, MAX_ERROR_CHARS);
    }
    match outcome.status {
        RunStatus::Exited(code) => format!("Process exited with status {}", code),
        RunStatus::Signaled(signal) => format!("Process killed by signal {}", signal),
        RunStatus::TimeLimitExceeded => "Process killed by watchdog".to_string(),
    }
}

pub mod grade;
pub mod practice;

use crate::challenges::Catalog;
use crate::core::Verdict;
use crate::grader::Grader;
use crate::jobs::grade::GradeJob;
use crate::jobs::practice::PracticeJob;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

/// Worker job enum - represents different types of jobs the worker can process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Grade a match submission against function test cases
    #[serde(rename = "grade")]
    Grade(GradeJob),
    /// Check a practice script against stdin/stdout cases
    #[serde(rename = "practice")]
    Practice(PracticeJob),
}

impl WorkerJob {
    pub fn submission_id(&self) -> i64 {
        match self {
            WorkerJob::Grade(job) => job.submission_id,
            WorkerJob::Practice(job) => job.submission_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    Graded,
    SystemError,
}

/// Result stored and published for every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub submission_id: i64,
    pub status: GradeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub grading_time_ms: u64,
}

impl GradeResult {
    pub fn graded(submission_id: i64, verdict: Verdict, grading_time_ms: u64) -> Self {
        Self {
            submission_id,
            status: GradeStatus::Graded,
            verdict: Some(verdict),
            error_message: None,
            grading_time_ms,
        }
    }

    pub fn system_error(submission_id: i64, message: String, grading_time_ms: u64) -> Self {
        Self {
            submission_id,
            status: GradeStatus::SystemError,
            verdict: None,
            error_message: Some(message),
            grading_time_ms,
        }
    }
}

/// Run a job to completion. Failures become `system_error` results.
pub async fn process_job(job: &WorkerJob, grader: &Grader, catalog: &Catalog) -> GradeResult {
    let started = Instant::now();
    let submission_id = job.submission_id();

    let outcome = match job {
        WorkerJob::Grade(job) => grade::process_grade_job(job, grader, catalog).await,
        WorkerJob::Practice(job) => practice::process_practice_job(job, grader).await,
    };
    let grading_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(verdict) => {
            info!(
                "Job completed: submission_id={}, passed={}/{}",
                submission_id, verdict.passed, verdict.total
            );
            GradeResult::graded(submission_id, verdict, grading_time_ms)
        }
        Err(e) => {
            error!("Failed to process job {}: {:#}", submission_id, e);
            GradeResult::system_error(submission_id, format!("{:#}", e), grading_time_ms)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runner::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
    use crate::sandbox::SandboxConfig;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Pretends to be the interpreter: function calls return the sum of their
    /// integer arguments, scripts echo their stdin.
    pub(crate) struct SummingRunner;

    #[async_trait]
    impl Runner for SummingRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _limits: &RunLimits,
            stdin: Option<&str>,
        ) -> anyhow::Result<RunOutcome> {
            let stdin = stdin.unwrap_or("");
            let stdout = if cmd.args.iter().any(|a| a == "harness.py") {
                let request: Value = serde_json::from_str(stdin)?;
                let sum: i64 = request["args"]
                    .as_array()
                    .map(|args| args.iter().filter_map(Value::as_i64).sum())
                    .unwrap_or(0);
                let reply = json!({
                    "status": "ok",
                    "value": sum,
                    "stdout": "",
                    "token": request["token"],
                });
                format!("{}\n", reply)
            } else {
                stdin.to_string()
            };
            Ok(RunOutcome {
                time_ms: 1,
                stdout,
                stderr: String::new(),
                truncated: false,
                status: RunStatus::Exited(0),
            })
        }
    }

    pub(crate) fn summing_grader() -> Grader {
        Grader::with_runner(SandboxConfig::default(), Arc::new(SummingRunner))
    }

    #[test]
    fn test_job_tagging() {
        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "grade",
            "submission_id": 7,
            "source": "def add_numbers(a, b): return a + b",
            "challenge_id": "sum-of-two-numbers"
        }))
        .unwrap();
        assert!(matches!(job, WorkerJob::Grade(_)));
        assert_eq!(job.submission_id(), 7);

        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "practice",
            "submission_id": 8,
            "source": "print(input())",
            "cases": [{"input": "hi\n", "expected_output": "hi"}]
        }))
        .unwrap();
        assert!(matches!(job, WorkerJob::Practice(_)));

        let unknown = serde_json::from_value::<WorkerJob>(json!({"job_type": "judge"}));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_result_serialization() {
        let result = GradeResult::system_error(3, "Unknown challenge: nope".into(), 12);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!("system_error"));
        assert_eq!(value["error_message"], json!("Unknown challenge: nope"));
        assert!(value.get("verdict").is_none());

        let result = GradeResult::graded(4, Verdict::from_details(vec![]), 5);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!("graded"));
        assert_eq!(value["verdict"]["total"], json!(0));
    }

    #[tokio::test]
    async fn test_process_job_graded() {
        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "grade",
            "submission_id": 11,
            "source": "def add_numbers(a, b): return a + b",
            "challenge_id": "sum-of-two-numbers"
        }))
        .unwrap();
        let catalog = Catalog::builtin().unwrap();

        let result = process_job(&job, &summing_grader(), &catalog).await;

        assert_eq!(result.submission_id, 11);
        assert_eq!(result.status, GradeStatus::Graded);
        let verdict = result.verdict.unwrap();
        assert_eq!((verdict.passed, verdict.total), (4, 4));
    }

    #[tokio::test]
    async fn test_process_job_system_error() {
        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "grade",
            "submission_id": 12,
            "source": "def f(): pass",
            "challenge_id": "does-not-exist"
        }))
        .unwrap();

        let result = process_job(&job, &summing_grader(), &Catalog::default()).await;

        assert_eq!(result.status, GradeStatus::SystemError);
        assert!(result.verdict.is_none());
        assert!(result.error_message.unwrap().contains("does-not-exist"));
    }
}

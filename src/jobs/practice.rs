use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{StdioCase, Verdict};
use crate::grader::Grader;

/// Practice script checked by stdin/stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeJob {
    pub submission_id: i64,
    pub source: String,
    pub cases: Vec<StdioCase>,
}

pub async fn process_practice_job(job: &PracticeJob, grader: &Grader) -> Result<Verdict> {
    info!(
        "Received practice job: submission_id={}, cases={}",
        job.submission_id,
        job.cases.len()
    );

    let verdict = grader.grade_stdio(&job.source, &job.cases).await?;
    Ok(verdict)
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::challenges::Catalog;
use crate::core::{TestCase, Verdict};
use crate::grader::Grader;

/// Match submission to grade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeJob {
    pub submission_id: i64,
    pub source: String,
    /// Catalog challenge whose test cases apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    /// Inline test cases; take precedence over the challenge's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<Vec<TestCase>>,
}

pub async fn process_grade_job(
    job: &GradeJob,
    grader: &Grader,
    catalog: &Catalog,
) -> Result<Verdict> {
    let cases: &[TestCase] = match (&job.test_cases, &job.challenge_id) {
        (Some(cases), _) => cases,
        (None, Some(id)) => {
            let challenge = catalog
                .get(id)
                .with_context(|| format!("Unknown challenge: {}", id))?;
            &challenge.test_cases
        }
        (None, None) => anyhow::bail!("Job has neither test cases nor a challenge id"),
    };

    info!(
        "Received grade job: submission_id={}, challenge={}, cases={}",
        job.submission_id,
        job.challenge_id.as_deref().unwrap_or("inline"),
        cases.len()
    );

    let verdict = grader.grade(&job.source, cases).await?;
    Ok(verdict)
}

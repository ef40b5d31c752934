//! Request and response bodies

use chrono::Utc;
use maes_common::job::{JobSpec, DEFAULT_PRIORITY};
use maes_common::{Assessment, Benchmark, ControlResult, TriggeredBy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `POST /assessment/start`
#[derive(Debug, Clone, Deserialize)]
pub struct StartAssessmentRequest {
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    /// Defaults to a timestamped name
    pub name: Option<String>,
    /// Requesting user, when the call is made on a user's behalf
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub parameters: Value,
    pub priority: Option<i16>,
}

impl StartAssessmentRequest {
    pub fn into_job_spec(self) -> JobSpec {
        let triggered_by = match self.user_id {
            Some(user) => TriggeredBy::User(user),
            None => TriggeredBy::Api,
        };
        let name = self.name.unwrap_or_else(|| {
            format!("{} assessment - {}", self.benchmark, Utc::now().format("%Y-%m-%dT%H:%M:%SZ"))
        });
        let mut spec = JobSpec::new(self.tenant_id, self.benchmark, name, triggered_by)
            .with_parameters(self.parameters);
        spec.priority = self.priority.unwrap_or(DEFAULT_PRIORITY);
        spec
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAssessmentResponse {
    pub job_id: Uuid,
}

/// `GET /assessment/{id}`: the assessment with its results.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentDetail {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub results: Vec<ControlResult>,
}

/// `POST /assessment/{id}/report`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateReportRequest {
    pub format: maes_common::ReportFormat,
    #[serde(default = "default_kind")]
    pub kind: maes_common::ReportKind,
    #[serde(default)]
    pub options: maes_report::ReportOptions,
}

fn default_kind() -> maes_common::ReportKind {
    maes_common::ReportKind::Full
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub status: maes_common::job::JobStatus,
}

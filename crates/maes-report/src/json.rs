//! Canonical JSON export

use chrono::{DateTime, Utc};
use maes_common::{AssessmentStatus, Benchmark, ControlStatus, ReportKind, Totals};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Recommendation, ReportModel, SectionStat, SeveritySummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMetadata {
    pub assessment_id: Uuid,
    pub tenant_id: Uuid,
    pub benchmark: Benchmark,
    pub name: String,
    pub kind: ReportKind,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub status: AssessmentStatus,
    pub totals: Totals,
    pub overall_score: f64,
    pub weighted_score: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonControl {
    pub control_id: String,
    pub section: String,
    pub title: String,
    pub severity: maes_common::Severity,
    pub weight: f64,
    pub status: ControlStatus,
    pub score: f64,
    pub actual: Value,
    pub evidence: Value,
    pub remediation: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonStatistics {
    pub by_status: Totals,
    pub by_severity: SeveritySummary,
    pub by_section: Vec<SectionStat>,
}

/// The parseable report document; a JSON report round-trips through this
/// type back into the same summary and per-control tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub metadata: JsonMetadata,
    pub summary: JsonSummary,
    pub controls: Vec<JsonControl>,
    pub statistics: JsonStatistics,
    pub recommendations: Vec<Recommendation>,
}

impl JsonReport {
    pub fn from_model(model: &ReportModel, kind: ReportKind) -> Self {
        let a = &model.assessment;
        let controls = match kind {
            // The executive cut keeps aggregates only.
            ReportKind::Executive => Vec::new(),
            ReportKind::Full => model
                .entries
                .iter()
                .map(|e| JsonControl {
                    control_id: e.control_id.clone(),
                    section: e.section.clone(),
                    title: e.title.clone(),
                    severity: e.severity,
                    weight: e.weight,
                    status: e.status,
                    score: e.score,
                    actual: e.actual.clone(),
                    evidence: e.evidence.clone(),
                    remediation: e.remediation.clone(),
                    error_message: e.error_message.clone(),
                    checked_at: e.checked_at,
                })
                .collect(),
        };

        Self {
            metadata: JsonMetadata {
                assessment_id: a.id,
                tenant_id: a.tenant_id,
                benchmark: a.benchmark,
                name: a.name.clone(),
                kind,
                generated_at: model.generated_at,
            },
            summary: JsonSummary {
                status: a.status,
                totals: a.totals,
                overall_score: a.overall_score,
                weighted_score: a.weighted_score,
                started_at: a.started_at,
                completed_at: a.completed_at,
                duration_seconds: a.duration_seconds,
            },
            controls,
            statistics: JsonStatistics {
                by_status: a.totals,
                by_severity: model.severity,
                by_section: model.sections.clone(),
            },
            recommendations: model.recommendations.clone(),
        }
    }
}

/// Render the canonical JSON document.
pub fn render(model: &ReportModel, kind: ReportKind) -> Result<Vec<u8>, serde_json::Error> {
    let report = JsonReport::from_model(model, kind);
    serde_json::to_vec_pretty(&report)
}

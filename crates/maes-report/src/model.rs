//! Report model assembled from a completed assessment

use chrono::{DateTime, Utc};
use maes_catalog::ControlCatalog;
use maes_common::{Assessment, ControlResult, ControlStatus, Severity, Totals};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One control row joined with its catalog metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub control_id: String,
    pub section: String,
    pub title: String,
    pub severity: Severity,
    pub weight: f64,
    pub status: ControlStatus,
    pub score: f64,
    pub actual: Value,
    pub evidence: Value,
    pub remediation: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Compliance rollup for one benchmark section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStat {
    pub section: String,
    pub total: u32,
    pub compliant: u32,
    /// 100 × compliant / total
    pub compliance_pct: f64,
}

/// Non-compliance split by profile level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityStat {
    pub total: u32,
    pub non_compliant: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub level1: SeverityStat,
    pub level2: SeverityStat,
}

/// Priority bucket of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationPriority {
    Critical,
    High,
    Medium,
}

/// Deterministic remediation recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub title: String,
    pub detail: String,
    pub count: u32,
}

/// Everything a renderer needs.
#[derive(Debug, Clone)]
pub struct ReportModel {
    pub assessment: Assessment,
    pub entries: Vec<ReportEntry>,
    pub sections: Vec<SectionStat>,
    pub severity: SeveritySummary,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

impl ReportModel {
    pub fn build(
        assessment: Assessment,
        results: &[ControlResult],
        catalog: &ControlCatalog,
    ) -> Self {
        let mut entries: Vec<ReportEntry> = results
            .iter()
            .map(|r| {
                let definition = catalog.get(assessment.benchmark, &r.control_id);
                ReportEntry {
                    control_id: r.control_id.clone(),
                    section: definition.map(|d| d.section.clone()).unwrap_or_default(),
                    title: definition
                        .map(|d| d.title.clone())
                        .unwrap_or_else(|| r.control_id.clone()),
                    severity: definition.map(|d| d.severity).unwrap_or(Severity::Level1),
                    weight: definition.map(|d| d.weight).unwrap_or(1.0),
                    status: r.status,
                    score: r.score,
                    actual: r.actual.clone(),
                    evidence: r.evidence.clone(),
                    remediation: r.remediation.clone(),
                    error_message: r.error_message.clone(),
                    checked_at: r.checked_at,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.control_id.cmp(&b.control_id));

        let sections = section_stats(&entries);
        let severity = severity_summary(&entries);
        let recommendations =
            recommendations(&assessment.totals, assessment.overall_score, &severity);

        Self {
            assessment,
            entries,
            sections,
            severity,
            recommendations,
            generated_at: Utc::now(),
        }
    }

    /// Level-2 non-compliant controls, worst score first, capped at ten.
    pub fn critical_findings(&self) -> Vec<&ReportEntry> {
        let mut findings: Vec<&ReportEntry> = self
            .entries
            .iter()
            .filter(|e| e.severity == Severity::Level2 && e.status == ControlStatus::NonCompliant)
            .collect();
        findings.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.control_id.cmp(&b.control_id))
        });
        findings.truncate(10);
        findings
    }
}

fn section_stats(entries: &[ReportEntry]) -> Vec<SectionStat> {
    let mut stats: Vec<SectionStat> = Vec::new();
    for entry in entries {
        match stats.iter_mut().find(|s| s.section == entry.section) {
            Some(stat) => {
                stat.total += 1;
                if entry.status == ControlStatus::Compliant {
                    stat.compliant += 1;
                }
            }
            None => stats.push(SectionStat {
                section: entry.section.clone(),
                total: 1,
                compliant: u32::from(entry.status == ControlStatus::Compliant),
                compliance_pct: 0.0,
            }),
        }
    }
    for stat in &mut stats {
        stat.compliance_pct = if stat.total == 0 {
            0.0
        } else {
            maes_common::scoring::round2(100.0 * stat.compliant as f64 / stat.total as f64)
        };
    }
    stats
}

fn severity_summary(entries: &[ReportEntry]) -> SeveritySummary {
    let mut summary = SeveritySummary::default();
    for entry in entries {
        let bucket = match entry.severity {
            Severity::Level1 => &mut summary.level1,
            Severity::Level2 => &mut summary.level2,
        };
        bucket.total += 1;
        if entry.status == ControlStatus::NonCompliant {
            bucket.non_compliant += 1;
        }
    }
    summary
}

/// The deterministic recommendation rules.
pub fn recommendations(
    totals: &Totals,
    overall_score: f64,
    severity: &SeveritySummary,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if severity.level2.non_compliant > 0 {
        out.push(Recommendation {
            priority: RecommendationPriority::Critical,
            title: "Address Critical Security Controls".into(),
            detail: "Level 2 controls are failing; remediate these before anything else.".into(),
            count: severity.level2.non_compliant,
        });
    }
    if totals.manual_review > 0 {
        out.push(Recommendation {
            priority: RecommendationPriority::High,
            title: "Complete Manual Reviews".into(),
            detail: "Controls without an automated verdict need a human decision.".into(),
            count: totals.manual_review,
        });
    }
    if overall_score < 70.0 {
        out.push(Recommendation {
            priority: RecommendationPriority::High,
            title: "Improve Overall Compliance Posture".into(),
            detail: "The overall score is below the 70% target.".into(),
            count: totals.non_compliant,
        });
    }
    out
}

//! Assessment comparison

use maes_common::scoring::round2;
use maes_common::{Assessment, AssessmentStatus, ControlResult, ControlStatus, CoreError, CoreResult};
use maes_store::Store;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-control change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeClass {
    Resolved,
    NewIssue,
    Improved,
    Degraded,
    Unchanged,
}

/// Direction of the posture between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Magnitude bucket of the score movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Significance {
    Major,
    Moderate,
    Minor,
}

/// One control's movement between baseline and current.
#[derive(Debug, Clone, Serialize)]
pub struct ControlChange {
    pub control_id: String,
    pub baseline_status: Option<ControlStatus>,
    pub current_status: Option<ControlStatus>,
    pub baseline_score: Option<f64>,
    pub current_score: Option<f64>,
    pub class: ChangeClass,
}

/// Aggregate change counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub resolved: u32,
    pub new_issues: u32,
    pub improved: u32,
    pub degraded: u32,
    pub unchanged: u32,
}

/// Structured change report between two completed assessments.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentDiff {
    pub baseline_id: Uuid,
    pub current_id: Uuid,
    pub changes: Vec<ControlChange>,
    pub counts: DiffCounts,
    pub score_change: f64,
    pub weighted_score_change: f64,
    pub trend: Trend,
    pub significance: Significance,
}

/// Classify one control's transition.
///
/// Manual-review and not-applicable transitions (including against
/// compliant) classify as unchanged.
pub fn classify(
    baseline: Option<(ControlStatus, f64)>,
    current: Option<(ControlStatus, f64)>,
) -> ChangeClass {
    use ControlStatus::*;
    match (baseline, current) {
        (Some((Compliant, _)), Some((NonCompliant, _))) => ChangeClass::Degraded,
        (Some((NonCompliant, _)), Some((Compliant, _))) => ChangeClass::Resolved,
        (Some((NonCompliant, b)), Some((NonCompliant, c))) if c > b => ChangeClass::Improved,
        (Some((NonCompliant, b)), Some((NonCompliant, c))) if c < b => ChangeClass::Degraded,
        (None, Some((NonCompliant, _))) => ChangeClass::NewIssue,
        (Some((NonCompliant, _)), None) => ChangeClass::Resolved,
        _ => ChangeClass::Unchanged,
    }
}

fn trend(score_change: f64) -> Trend {
    if score_change > 2.0 {
        Trend::Improving
    } else if score_change < -2.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn significance(score_change: f64) -> Significance {
    let magnitude = score_change.abs();
    if magnitude >= 10.0 {
        Significance::Major
    } else if magnitude >= 5.0 {
        Significance::Moderate
    } else {
        Significance::Minor
    }
}

/// Diff two completed assessments over the union of their controls.
pub fn compare(
    baseline: &Assessment,
    baseline_results: &[ControlResult],
    current: &Assessment,
    current_results: &[ControlResult],
) -> AssessmentDiff {
    let index = |results: &[ControlResult]| -> BTreeMap<String, (ControlStatus, f64)> {
        results
            .iter()
            .map(|r| (r.control_id.clone(), (r.status, r.score)))
            .collect()
    };
    let base = index(baseline_results);
    let curr = index(current_results);

    let mut ids: Vec<&String> = base.keys().chain(curr.keys()).collect();
    ids.sort();
    ids.dedup();

    let mut counts = DiffCounts::default();
    let changes: Vec<ControlChange> = ids
        .into_iter()
        .map(|id| {
            let b = base.get(id).copied();
            let c = curr.get(id).copied();
            let class = classify(b, c);
            match class {
                ChangeClass::Resolved => counts.resolved += 1,
                ChangeClass::NewIssue => counts.new_issues += 1,
                ChangeClass::Improved => counts.improved += 1,
                ChangeClass::Degraded => counts.degraded += 1,
                ChangeClass::Unchanged => counts.unchanged += 1,
            }
            ControlChange {
                control_id: id.clone(),
                baseline_status: b.map(|(s, _)| s),
                current_status: c.map(|(s, _)| s),
                baseline_score: b.map(|(_, s)| s),
                current_score: c.map(|(_, s)| s),
                class,
            }
        })
        .collect();

    let score_change = round2(current.overall_score - baseline.overall_score);
    let weighted_score_change = round2(current.weighted_score - baseline.weighted_score);

    AssessmentDiff {
        baseline_id: baseline.id,
        current_id: current.id,
        changes,
        counts,
        score_change,
        weighted_score_change,
        trend: trend(score_change),
        significance: significance(score_change),
    }
}

/// Store-backed comparator behind the compare endpoint.
pub struct Comparator {
    store: Store,
}

impl Comparator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn compare(&self, baseline_id: Uuid, current_id: Uuid) -> CoreResult<AssessmentDiff> {
        let baseline = self
            .store
            .assessments
            .get(baseline_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("assessment {baseline_id}")))?;
        let current = self
            .store
            .assessments
            .get(current_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("assessment {current_id}")))?;

        for a in [&baseline, &current] {
            if a.status != AssessmentStatus::Completed {
                return Err(CoreError::NotReady(format!(
                    "assessment {} is {}, not completed",
                    a.id,
                    a.status.as_str()
                )));
            }
        }

        let baseline_results = self.store.results.list_for_assessment(baseline_id).await?;
        let current_results = self.store.results.list_for_assessment(current_id).await?;
        Ok(compare(&baseline, &baseline_results, &current, &current_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maes_common::{Benchmark, Totals, TriggeredBy};
    use serde_json::Value;

    fn assessment(overall: f64, weighted: f64) -> Assessment {
        let mut a = Assessment::new(
            Uuid::new_v4(),
            Benchmark::CisV4,
            "run".into(),
            TriggeredBy::Api,
            Value::Null,
        );
        a.status = AssessmentStatus::Completed;
        a.progress = 100;
        a.overall_score = overall;
        a.weighted_score = weighted;
        a.totals = Totals::default();
        a
    }

    fn result(assessment_id: Uuid, control_id: &str, status: ControlStatus, score: f64) -> ControlResult {
        ControlResult {
            id: Uuid::new_v4(),
            assessment_id,
            control_id: control_id.into(),
            status,
            score,
            actual: Value::Null,
            evidence: Value::Null,
            remediation: None,
            error_message: None,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn classification_table() {
        use ControlStatus::*;
        assert_eq!(classify(Some((Compliant, 100.0)), Some((Compliant, 100.0))), ChangeClass::Unchanged);
        assert_eq!(classify(Some((Compliant, 100.0)), Some((NonCompliant, 0.0))), ChangeClass::Degraded);
        assert_eq!(classify(Some((NonCompliant, 0.0)), Some((Compliant, 100.0))), ChangeClass::Resolved);
        assert_eq!(classify(Some((NonCompliant, 30.0)), Some((NonCompliant, 60.0))), ChangeClass::Improved);
        assert_eq!(classify(Some((NonCompliant, 60.0)), Some((NonCompliant, 30.0))), ChangeClass::Degraded);
        assert_eq!(classify(None, Some((NonCompliant, 0.0))), ChangeClass::NewIssue);
        assert_eq!(classify(Some((NonCompliant, 0.0)), None), ChangeClass::Resolved);
        // Manual review against compliant stays unchanged.
        assert_eq!(classify(Some((ManualReview, 0.0)), Some((Compliant, 100.0))), ChangeClass::Unchanged);
        assert_eq!(classify(Some((Compliant, 100.0)), Some((ManualReview, 0.0))), ChangeClass::Unchanged);
        assert_eq!(classify(None, Some((Compliant, 100.0))), ChangeClass::Unchanged);
    }

    #[test]
    fn new_and_resolved_issues_are_counted() {
        // Baseline: 1.1.1 and 1.2.1 non-compliant.
        // Current: 1.1.1 compliant, 1.2.1 absent, 8.2.2 non-compliant.
        let baseline = assessment(0.0, 0.0);
        let current = assessment(50.0, 50.0);
        let b = vec![
            result(baseline.id, "1.1.1", ControlStatus::NonCompliant, 0.0),
            result(baseline.id, "1.2.1", ControlStatus::NonCompliant, 0.0),
        ];
        let c = vec![
            result(current.id, "1.1.1", ControlStatus::Compliant, 100.0),
            result(current.id, "8.2.2", ControlStatus::NonCompliant, 0.0),
        ];

        let diff = compare(&baseline, &b, &current, &c);
        assert_eq!(diff.counts.resolved, 2);
        assert_eq!(diff.counts.new_issues, 1);
        assert_eq!(diff.counts.improved, 0);
        assert_eq!(diff.counts.degraded, 0);
        assert_eq!(diff.counts.unchanged, 0);
        assert_eq!(diff.score_change, 50.0);
        assert_eq!(diff.trend, Trend::Improving);
        assert_eq!(diff.significance, Significance::Major);
    }

    #[test]
    fn swap_negates_score_and_exchanges_classes() {
        let left = assessment(40.0, 45.0);
        let right = assessment(43.5, 50.0);
        let left_results = vec![
            result(left.id, "1.1.1", ControlStatus::NonCompliant, 30.0),
            result(left.id, "1.2.1", ControlStatus::NonCompliant, 0.0),
            result(left.id, "5.1.1", ControlStatus::Compliant, 100.0),
        ];
        let right_results = vec![
            result(right.id, "1.1.1", ControlStatus::NonCompliant, 70.0),
            result(right.id, "5.1.1", ControlStatus::Compliant, 100.0),
            result(right.id, "8.2.2", ControlStatus::NonCompliant, 0.0),
        ];

        let forward = compare(&left, &left_results, &right, &right_results);
        let backward = compare(&right, &right_results, &left, &left_results);

        assert_eq!(forward.score_change, -backward.score_change);
        assert_eq!(forward.weighted_score_change, -backward.weighted_score_change);
        assert_eq!(forward.counts.resolved, backward.counts.new_issues);
        assert_eq!(forward.counts.new_issues, backward.counts.resolved);
        assert_eq!(forward.counts.improved, backward.counts.degraded);
        assert_eq!(forward.counts.degraded, backward.counts.improved);
        assert_eq!(forward.counts.unchanged, backward.counts.unchanged);
    }

    #[test]
    fn trend_and_significance_thresholds() {
        assert_eq!(trend(2.5), Trend::Improving);
        assert_eq!(trend(2.0), Trend::Stable);
        assert_eq!(trend(-2.0), Trend::Stable);
        assert_eq!(trend(-2.5), Trend::Declining);
        assert_eq!(significance(10.0), Significance::Major);
        assert_eq!(significance(-7.0), Significance::Moderate);
        assert_eq!(significance(4.9), Significance::Minor);
    }

    #[tokio::test]
    async fn comparator_requires_completed_assessments() {
        let store = Store::in_memory();
        let mut pending = assessment(0.0, 0.0);
        pending.status = AssessmentStatus::Running;
        pending.progress = 40;
        let done = assessment(80.0, 85.0);
        store.assessments.insert(&pending).await.unwrap();
        store.assessments.insert(&done).await.unwrap();

        let comparator = Comparator::new(store);
        match comparator.compare(pending.id, done.id).await {
            Err(CoreError::NotReady(_)) => {}
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn comparator_404s_on_missing_assessment() {
        let comparator = Comparator::new(Store::in_memory());
        match comparator.compare(Uuid::new_v4(), Uuid::new_v4()).await {
            Err(CoreError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }
}

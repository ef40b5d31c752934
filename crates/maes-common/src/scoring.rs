//! Score computation shared by the engine and the report generator

use crate::model::{ControlStatus, Severity};

/// One scored result joined with its control's weight and severity.
#[derive(Debug, Clone, Copy)]
pub struct ScoredControl {
    pub status: ControlStatus,
    /// 0..100
    pub score: f64,
    pub weight: f64,
    pub severity: Severity,
}

impl ScoredControl {
    /// Evaluated results are the ones an automated verdict exists for:
    /// notApplicable and manualReview are omitted from both averages.
    fn evaluated(&self) -> bool {
        !matches!(
            self.status,
            ControlStatus::NotApplicable | ControlStatus::ManualReview
        )
    }

    fn effective_weight(&self) -> f64 {
        self.weight * self.severity.multiplier()
    }
}

/// Round half-up to two decimals.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `100 × compliant / evaluated`. Undefined (nothing evaluated) yields 0.
pub fn overall_score(results: &[ScoredControl]) -> f64 {
    let evaluated = results.iter().filter(|r| r.evaluated()).count();
    if evaluated == 0 {
        return 0.0;
    }
    let compliant = results
        .iter()
        .filter(|r| r.status == ControlStatus::Compliant)
        .count();
    round2(100.0 * compliant as f64 / evaluated as f64)
}

/// `100 × Σ(score/100 × w) / Σ w` over evaluated results, with
/// `w = weight × severity multiplier`. Undefined yields 0.
pub fn weighted_score(results: &[ScoredControl]) -> f64 {
    let mut acc = 0.0;
    let mut denom = 0.0;
    for r in results.iter().filter(|r| r.evaluated()) {
        let w = r.effective_weight();
        acc += (r.score / 100.0) * w;
        denom += w;
    }
    if denom == 0.0 {
        return 0.0;
    }
    round2(100.0 * acc / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sc(status: ControlStatus, score: f64, weight: f64, severity: Severity) -> ScoredControl {
        ScoredControl { status, score, weight, severity }
    }

    #[test]
    fn rounding_is_half_up_to_cents() {
        assert_eq!(round2(66.66666), 66.67);
        assert_eq!(round2(2.0 / 3.0 * 100.0), 66.67);
        assert_eq!(round2(100.0), 100.0);
        assert_eq!(round2(0.005), 0.01);
    }

    #[test]
    fn manual_review_is_omitted_from_both_averages() {
        // Two compliant controls plus one manual review: evaluated = 2
        let results = vec![
            sc(ControlStatus::Compliant, 100.0, 1.0, Severity::Level2),
            sc(ControlStatus::Compliant, 100.0, 1.0, Severity::Level1),
            sc(ControlStatus::ManualReview, 0.0, 0.5, Severity::Level1),
        ];
        assert_eq!(overall_score(&results), 100.0);
        assert_eq!(weighted_score(&results), 100.0);
    }

    #[test]
    fn not_applicable_is_excluded_from_both_averages() {
        let results = vec![
            sc(ControlStatus::Compliant, 100.0, 1.0, Severity::Level1),
            sc(ControlStatus::NotApplicable, 0.0, 1.0, Severity::Level2),
        ];
        assert_eq!(overall_score(&results), 100.0);
        assert_eq!(weighted_score(&results), 100.0);
    }

    #[test]
    fn weighted_applies_severity_multiplier() {
        // Single level2 control scoring 66.67 while non-compliant
        let results = vec![sc(ControlStatus::NonCompliant, 66.67, 1.0, Severity::Level2)];
        assert_eq!(overall_score(&results), 0.0);
        // 66.67 × 1.5 / 1.5
        assert_eq!(weighted_score(&results), 66.67);
    }

    #[test]
    fn weighted_mixes_weights() {
        let results = vec![
            sc(ControlStatus::Compliant, 100.0, 1.0, Severity::Level2), // w = 1.5
            sc(ControlStatus::NonCompliant, 0.0, 0.5, Severity::Level1), // w = 0.5
        ];
        // (1.0×1.5 + 0.0×0.5) / 2.0 = 0.75
        assert_eq!(weighted_score(&results), 75.0);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(overall_score(&[]), 0.0);
        assert_eq!(weighted_score(&[]), 0.0);
        let only_na = vec![sc(ControlStatus::NotApplicable, 0.0, 1.0, Severity::Level1)];
        assert_eq!(overall_score(&only_na), 0.0);
        assert_eq!(weighted_score(&only_na), 0.0);
    }

    #[test]
    fn all_error_run_scores_zero() {
        let results = vec![
            sc(ControlStatus::Error, 0.0, 1.0, Severity::Level1),
            sc(ControlStatus::Error, 0.0, 1.0, Severity::Level2),
        ];
        assert_eq!(overall_score(&results), 0.0);
        assert_eq!(weighted_score(&results), 0.0);
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Severity;

/// Final tri-state verdict attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Review,
}

/// Severity-to-weight map for the deduction scorer. The exact values are
/// tunable policy; the ordering `critical > warning > info` is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub critical: f32,
    pub warning: f32,
    pub info: f32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 30.0,
            warning: 15.0,
            info: 5.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }

    /// Enforce the ordering invariant before the weights are used.
    pub fn validate(&self) -> Result<(), ScoreConfigError> {
        if !(self.critical > self.warning && self.warning > self.info && self.info >= 0.0) {
            return Err(ScoreConfigError::UnorderedWeights {
                critical: self.critical,
                warning: self.warning,
                info: self.info,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone)]
pub enum ScoreConfigError {
    #[error(
        "severity weights must satisfy critical > warning > info >= 0 \
         (got {critical}/{warning}/{info})"
    )]
    UnorderedWeights {
        critical: f32,
        warning: f32,
        info: f32,
    },
}

/// Tunable scoring policy carried by the pipeline and report assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: SeverityWeights,
    /// Whether OCR-extracted image-text violations count toward score and
    /// status. They are always listed in the report either way.
    pub include_image_text: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            include_image_text: true,
        }
    }
}

/// The scorer's output pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: u8,
    pub status: Status,
}

const FAIL_BELOW: u8 = 60;
const REVIEW_BELOW: u8 = 80;

/// Aggregate `(severity, confidence)` signals into a clamped 0–100 score and
/// a pass/fail/review status. Pure and order-independent: summation is
/// commutative and status only inspects the severity multiset.
pub fn score_violations<I>(signals: I, weights: &SeverityWeights) -> ScoreOutcome
where
    I: IntoIterator<Item = (Severity, f32)>,
{
    let mut score = 100.0f32;
    let mut has_critical = false;
    let mut has_warning = false;

    for (severity, confidence) in signals {
        score -= weights.weight(severity) * confidence;
        match severity {
            Severity::Critical => has_critical = true,
            Severity::Warning => has_warning = true,
            Severity::Info => {}
        }
    }

    let score = score.round().clamp(0.0, 100.0) as u8;
    let status = if has_critical || score < FAIL_BELOW {
        Status::Fail
    } else if has_warning || score < REVIEW_BELOW {
        Status::Review
    } else {
        Status::Pass
    };

    ScoreOutcome { score, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_is_perfect_pass() {
        let outcome = score_violations([], &SeverityWeights::default());
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.status, Status::Pass);
    }

    #[test]
    fn single_full_confidence_critical_fails_despite_score_70() {
        let outcome = score_violations(
            [(Severity::Critical, 1.0)],
            &SeverityWeights::default(),
        );
        assert_eq!(outcome.score, 70);
        assert_eq!(outcome.status, Status::Fail);
    }

    #[test]
    fn warnings_land_in_review() {
        let outcome = score_violations(
            [(Severity::Warning, 0.5)],
            &SeverityWeights::default(),
        );
        assert_eq!(outcome.score, 93);
        assert_eq!(outcome.status, Status::Review);
    }

    #[test]
    fn info_only_stays_pass_above_80() {
        let outcome = score_violations(
            [(Severity::Info, 1.0), (Severity::Info, 1.0)],
            &SeverityWeights::default(),
        );
        assert_eq!(outcome.score, 90);
        assert_eq!(outcome.status, Status::Pass);
    }

    #[test]
    fn low_score_without_criticals_still_fails() {
        // Nine full-confidence warnings push the score below 60.
        let signals = std::iter::repeat((Severity::Warning, 1.0)).take(9);
        let outcome = score_violations(signals, &SeverityWeights::default());
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.status, Status::Fail);
    }

    #[test]
    fn weight_ordering_invariant_enforced() {
        let weights = SeverityWeights {
            critical: 10.0,
            warning: 15.0,
            info: 5.0,
        };
        assert!(weights.validate().is_err());
        assert!(SeverityWeights::default().validate().is_ok());
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Critical),
            Just(Severity::Warning),
            Just(Severity::Info),
        ]
    }

    proptest! {
        #[test]
        fn score_always_clamped(
            signals in proptest::collection::vec((severity_strategy(), 0.0f32..=1.0), 0..40)
        ) {
            let outcome = score_violations(signals, &SeverityWeights::default());
            prop_assert!(outcome.score <= 100);
        }

        #[test]
        fn adding_a_violation_never_raises_score(
            signals in proptest::collection::vec((severity_strategy(), 0.0f32..=1.0), 0..20),
            extra in (severity_strategy(), 0.0f32..=1.0)
        ) {
            let weights = SeverityWeights::default();
            let base = score_violations(signals.clone(), &weights);
            let mut grown = signals;
            grown.push(extra);
            let larger = score_violations(grown, &weights);
            prop_assert!(larger.score <= base.score);
        }

        #[test]
        fn any_critical_forces_fail(
            signals in proptest::collection::vec((severity_strategy(), 0.0f32..=1.0), 0..20),
            confidence in 0.0f32..=1.0
        ) {
            let mut signals = signals;
            signals.push((Severity::Critical, confidence));
            let outcome = score_violations(signals, &SeverityWeights::default());
            prop_assert_eq!(outcome.status, Status::Fail);
        }

        #[test]
        fn permutation_does_not_change_outcome(
            signals in proptest::collection::vec((severity_strategy(), 0.0f32..=1.0), 0..20)
        ) {
            let weights = SeverityWeights::default();
            let forward = score_violations(signals.clone(), &weights);
            let mut reversed = signals;
            reversed.reverse();
            let backward = score_violations(reversed, &weights);
            prop_assert_eq!(forward, backward);
        }
    }
}

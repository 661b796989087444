//! Deterministic verdict scoring.
//!
//! Category scores are on a 0-10 scale. Exclusion codes override every
//! positive score; otherwise the label is chosen from a descending tier
//! table keyed on the best positive score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ConfigError;
use crate::model::{ClassificationVerdict, CriterionCode, FinalLabel};

const MAX_SCORE: f64 = 10.0;
const TIER_EPSILON: f64 = 1e-9;

/// Weights and tier thresholds for [`Scorer`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Base score for an asserted criterion.
    pub presence_weight: f64,
    /// Added per matched evidence span, up to `evidence_saturation` spans.
    pub evidence_weight: f64,
    pub evidence_saturation: u32,
    /// Multiplies the verdict confidence (clamped to `[0, 1]`).
    pub confidence_weight: f64,
    /// Confidence assumed when the classifier supplied none.
    pub default_confidence: f64,
    pub strategic_threshold: f64,
    pub priority_threshold: f64,
    pub regular_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            presence_weight: 5.0,
            evidence_weight: 0.6,
            evidence_saturation: 5,
            confidence_weight: 2.0,
            default_confidence: 0.5,
            strategic_threshold: 8.0,
            priority_threshold: 6.5,
            regular_threshold: 5.0,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("presence_weight", self.presence_weight),
            ("evidence_weight", self.evidence_weight),
            ("confidence_weight", self.confidence_weight),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError(format!(
                    "scoring.{} must be a non-negative number (got {})",
                    name, w
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(ConfigError(format!(
                "scoring.default_confidence must be within [0, 1] (got {})",
                self.default_confidence
            )));
        }
        let descending = self.strategic_threshold > self.priority_threshold
            && self.priority_threshold > self.regular_threshold;
        if !descending || !self.regular_threshold.is_finite() {
            return Err(ConfigError(format!(
                "scoring thresholds must be strictly descending (strategic {} > priority {} > regular {})",
                self.strategic_threshold, self.priority_threshold, self.regular_threshold
            )));
        }
        Ok(())
    }
}

/// Category scores and final label for one verdict set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub category_scores: BTreeMap<CriterionCode, f64>,
    pub final_label: FinalLabel,
}

impl ScoreCard {
    /// Highest positive-category score (0 when none asserted).
    pub fn best_score(&self) -> f64 {
        self.category_scores.values().copied().fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    policy: ScoringPolicy,
}

impl Scorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Scores one positive criterion. Evidence counts come from the verdict.
    pub fn category_score(&self, verdict: &ClassificationVerdict, code: CriterionCode) -> f64 {
        let Some(v) = verdict.get(code) else {
            return 0.0;
        };
        if !v.asserted {
            return 0.0;
        }
        let p = &self.policy;
        let evidence = v.evidence_count.min(p.evidence_saturation) as f64;
        let confidence = v
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(p.default_confidence)
            .clamp(0.0, 1.0);
        let raw =
            p.presence_weight + p.evidence_weight * evidence + p.confidence_weight * confidence;
        raw.min(MAX_SCORE)
    }

    pub fn score(&self, verdict: &ClassificationVerdict) -> ScoreCard {
        let category_scores: BTreeMap<CriterionCode, f64> = CriterionCode::POSITIVE
            .iter()
            .map(|code| (*code, self.category_score(verdict, *code)))
            .collect();

        let excluded = CriterionCode::EXCLUSIONS
            .iter()
            .any(|code| verdict.is_asserted(*code));

        let final_label = if excluded {
            FinalLabel::Excluded
        } else {
            let best = category_scores.values().copied().fold(0.0, f64::max);
            self.tier(best)
        };

        ScoreCard {
            category_scores,
            final_label,
        }
    }

    /// Maps a positive score onto the tier table. A score equal to a
    /// threshold takes the higher tier.
    pub fn tier(&self, best: f64) -> FinalLabel {
        let p = &self.policy;
        let tiers = [
            (p.strategic_threshold, FinalLabel::Strategic),
            (p.priority_threshold, FinalLabel::Priority),
            (p.regular_threshold, FinalLabel::Regular),
        ];
        for (threshold, label) in tiers {
            if best + TIER_EPSILON >= threshold {
                return label;
            }
        }
        FinalLabel::LowPriority
    }
}

//! Views over run outcomes for the reporting sink.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::batch::RunStatsSnapshot;
use crate::errors::FailureKind;
use crate::model::{CachedResult, ClassificationOutcome, CriterionCode, FinalLabel, ResultSource};

/// Preference when two categories share the best score.
pub const CATEGORY_TIE_ORDER: [CriterionCode; 4] = [
    CriterionCode::CellFree,
    CriterionCode::GrowthFactors,
    CriterionCode::ProteinProduction,
    CriterionCode::GeneSynthesis,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentEntry {
    pub profile_id: String,
    pub fingerprint: String,
    pub final_label: FinalLabel,
    pub best_score: f64,
    pub category_scores: BTreeMap<CriterionCode, f64>,
}

impl SegmentEntry {
    fn new(profile_id: &str, result: &CachedResult) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            fingerprint: result.fingerprint.to_string(),
            final_label: result.final_label,
            best_score: best_category(result).map(|(_, s)| s).unwrap_or(0.0),
            category_scores: result.category_scores.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub profile_id: String,
    pub fingerprint: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Successes grouped by best positive category, plus exclusions, the
/// consolidated viable list and failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Segmentation {
    pub categories: BTreeMap<CriterionCode, Vec<SegmentEntry>>,
    pub excluded: Vec<SegmentEntry>,
    pub viable: Vec<SegmentEntry>,
    pub failed: Vec<FailedEntry>,
}

/// Highest-scoring positive category; `None` when every score is zero.
pub fn best_category(result: &CachedResult) -> Option<(CriterionCode, f64)> {
    let mut best: Option<(CriterionCode, f64)> = None;
    for code in CATEGORY_TIE_ORDER {
        let score = result.category_score(code);
        if score <= 0.0 {
            continue;
        }
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((code, score)),
        }
    }
    best
}

fn by_score_desc(entries: &mut [SegmentEntry]) {
    // stable: equal scores keep input order
    entries.sort_by(|a, b| b.best_score.total_cmp(&a.best_score));
}

impl Segmentation {
    pub fn from_outcomes(outcomes: &[ClassificationOutcome]) -> Self {
        let mut seg = Segmentation {
            categories: CriterionCode::POSITIVE
                .iter()
                .map(|c| (*c, Vec::new()))
                .collect(),
            ..Segmentation::default()
        };

        for outcome in outcomes {
            match outcome {
                ClassificationOutcome::Success {
                    profile_id, result, ..
                } => {
                    let entry = SegmentEntry::new(profile_id, result);
                    if result.final_label.is_excluded() {
                        seg.excluded.push(entry);
                        continue;
                    }
                    if let Some((code, _)) = best_category(result) {
                        seg.categories.entry(code).or_default().push(entry.clone());
                    }
                    seg.viable.push(entry);
                }
                ClassificationOutcome::Failed {
                    profile_id,
                    fingerprint,
                    kind,
                    message,
                } => seg.failed.push(FailedEntry {
                    profile_id: profile_id.clone(),
                    fingerprint: fingerprint.to_string(),
                    kind: *kind,
                    message: message.clone(),
                }),
            }
        }

        for list in seg.categories.values_mut() {
            by_score_desc(list);
        }
        by_score_desc(&mut seg.viable);
        seg
    }

    pub fn category(&self, code: CriterionCode) -> &[SegmentEntry] {
        self.categories.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if `profile_id` appears in any positive category list.
    pub fn in_any_category(&self, profile_id: &str) -> bool {
        self.categories
            .values()
            .flatten()
            .any(|e| e.profile_id == profile_id)
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub from_cache: usize,
    pub live: usize,
    pub by_label: BTreeMap<FinalLabel, usize>,
    pub by_failure: BTreeMap<FailureKind, usize>,
    pub classifier_calls: u64,
    pub retries: u64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ClassificationOutcome], stats: &RunStatsSnapshot) -> Self {
        let mut summary = RunSummary {
            total: outcomes.len(),
            classifier_calls: stats.classifier_calls,
            retries: stats.retries,
            ..RunSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                ClassificationOutcome::Success { source, result, .. } => {
                    summary.succeeded += 1;
                    match source {
                        ResultSource::Cache => summary.from_cache += 1,
                        ResultSource::Live => summary.live += 1,
                    }
                    *summary.by_label.entry(result.final_label).or_default() += 1;
                }
                ClassificationOutcome::Failed { kind, .. } => {
                    summary.failed += 1;
                    *summary.by_failure.entry(*kind).or_default() += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassificationVerdict, CriterionVerdict, Fingerprint};
    use chrono::Utc;

    fn success(id: &str, scores: &[(CriterionCode, f64)], label: FinalLabel) -> ClassificationOutcome {
        let verdicts = CriterionCode::ALL
            .iter()
            .map(|c| (*c, CriterionVerdict::asserted(false)))
            .collect();
        let mut category_scores: BTreeMap<CriterionCode, f64> = CriterionCode::POSITIVE
            .iter()
            .map(|c| (*c, 0.0))
            .collect();
        for (c, s) in scores {
            category_scores.insert(*c, *s);
        }
        ClassificationOutcome::Success {
            profile_id: id.to_string(),
            source: ResultSource::Live,
            result: CachedResult {
                fingerprint: Fingerprint::from_hex(format!("fp-{id}")),
                verdicts: ClassificationVerdict::from_complete(verdicts).unwrap(),
                category_scores,
                final_label: label,
                computed_at: Utc::now(),
            },
        }
    }

    #[test]
    fn profiles_land_in_their_best_category() {
        use CriterionCode::*;
        let outcomes = vec![
            success("a", &[(ProteinProduction, 9.0), (GeneSynthesis, 6.0)], FinalLabel::Strategic),
            success("b", &[(GeneSynthesis, 7.0)], FinalLabel::Priority),
            success("c", &[], FinalLabel::LowPriority),
        ];
        let seg = Segmentation::from_outcomes(&outcomes);
        assert_eq!(seg.category(ProteinProduction)[0].profile_id, "a");
        assert_eq!(seg.category(GeneSynthesis).len(), 1);
        assert_eq!(seg.category(GeneSynthesis)[0].profile_id, "b");
        assert!(!seg.in_any_category("c"));
        let viable: Vec<&str> = seg.viable.iter().map(|e| e.profile_id.as_str()).collect();
        assert_eq!(viable, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_prefer_cell_free_then_growth_factors() {
        use CriterionCode::*;
        let outcomes = vec![
            success("a", &[(ProteinProduction, 7.0), (CellFree, 7.0)], FinalLabel::Priority),
            success("b", &[(GeneSynthesis, 7.0), (GrowthFactors, 7.0)], FinalLabel::Priority),
            success("c", &[(GeneSynthesis, 7.0), (ProteinProduction, 7.0)], FinalLabel::Priority),
        ];
        let seg = Segmentation::from_outcomes(&outcomes);
        assert_eq!(seg.category(CellFree)[0].profile_id, "a");
        assert_eq!(seg.category(GrowthFactors)[0].profile_id, "b");
        assert_eq!(seg.category(ProteinProduction)[0].profile_id, "c");
        assert!(seg.category(GeneSynthesis).is_empty());
    }

    #[test]
    fn excluded_profiles_are_not_viable_and_not_categorized() {
        use CriterionCode::*;
        let outcomes = vec![
            success("x", &[(ProteinProduction, 9.5)], FinalLabel::Excluded),
            ClassificationOutcome::Failed {
                profile_id: "f".into(),
                fingerprint: Fingerprint::from_hex("fp-f"),
                kind: FailureKind::MissingResponse,
                message: "no entry".into(),
            },
        ];
        let seg = Segmentation::from_outcomes(&outcomes);
        assert!(!seg.in_any_category("x"));
        assert_eq!(seg.excluded.len(), 1);
        assert!(seg.viable.is_empty());
        assert_eq!(seg.failed[0].kind, FailureKind::MissingResponse);

        let summary = RunSummary::from_outcomes(&outcomes, &RunStatsSnapshot::default());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.by_label[&FinalLabel::Excluded], 1);
        assert_eq!(summary.by_failure[&FailureKind::MissingResponse], 1);
    }

    #[test]
    fn segmentation_serializes_with_code_keys() {
        let seg = Segmentation::from_outcomes(&[success(
            "a",
            &[(CriterionCode::CellFree, 8.0)],
            FinalLabel::Strategic,
        )]);
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["categories"]["C"][0]["profile_id"], "a");
        assert_eq!(json["viable"][0]["final_label"], "strategic");
    }
}

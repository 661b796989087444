use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::{BatchScheduler, CancelFlag, PendingItem, RunStats, RunStatsSnapshot};
use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::errors::{EngineError, FailureKind};
use crate::evidence;
use crate::model::{ClassificationOutcome, EvidenceMap, Fingerprint, ProfileRecord, ResultSource};
use crate::report::{RunSummary, Segmentation};
use crate::scoring::Scorer;
use crate::storage::ClassificationCache;

/// Result of one engine run: one outcome per input profile, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: RunStatsSnapshot,
    pub outcomes: Vec<ClassificationOutcome>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_outcomes(&self.outcomes, &self.stats)
    }

    pub fn segmentation(&self) -> Segmentation {
        Segmentation::from_outcomes(&self.outcomes)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ClassificationOutcome::is_success)
    }
}

/// Cache-aside classification engine.
pub struct Engine {
    config: EngineConfig,
    cache: ClassificationCache,
    classifier: Arc<dyn Classifier>,
    scorer: Scorer,
    cancel: CancelFlag,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        cache: ClassificationCache,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let scorer = Scorer::new(config.scoring.clone());
        Ok(Self {
            config,
            cache,
            classifier,
            scorer,
            cancel: CancelFlag::new(),
        })
    }

    /// Use an externally owned cancel flag (e.g. wired to Ctrl-C).
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that aborts a run between batches.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&self, profiles: &[ProfileRecord]) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let stats = RunStats::new();

        let extracted = extract_all(profiles)?;

        // one lookup and at most one classification per distinct fingerprint
        let mut resolved: HashMap<Fingerprint, ClassificationOutcome> = HashMap::new();
        let mut pending: Vec<PendingItem<'_>> = Vec::new();
        let mut queued: HashSet<&Fingerprint> = HashSet::new();

        for (profile, (fingerprint, evidence)) in profiles.iter().zip(&extracted) {
            if resolved.contains_key(fingerprint) || queued.contains(fingerprint) {
                continue;
            }
            if !self.config.refresh {
                match self.cache.get_async(fingerprint.clone()).await {
                    Ok(Some(mut result)) => {
                        stats.record_cache_hit();
                        // stored verdicts are reused; scores follow the current policy
                        let card = self.scorer.score(&result.verdicts);
                        result.category_scores = card.category_scores;
                        result.final_label = card.final_label;
                        resolved.insert(
                            fingerprint.clone(),
                            ClassificationOutcome::Success {
                                profile_id: profile.id.clone(),
                                source: ResultSource::Cache,
                                result,
                            },
                        );
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(profile = %profile.id, error = %e, "cache lookup failed");
                        stats.record_failed(1);
                        resolved.insert(
                            fingerprint.clone(),
                            ClassificationOutcome::Failed {
                                profile_id: profile.id.clone(),
                                fingerprint: fingerprint.clone(),
                                kind: FailureKind::StorageError,
                                message: e.to_string(),
                            },
                        );
                        continue;
                    }
                }
            }
            queued.insert(fingerprint);
            pending.push(PendingItem {
                profile,
                fingerprint: fingerprint.clone(),
                evidence: evidence.clone(),
            });
        }

        info!(
            run_id = %run_id,
            profiles = profiles.len(),
            distinct = resolved.len() + pending.len(),
            cache_hits = stats.snapshot().cache_hits,
            pending = pending.len(),
            refresh = self.config.refresh,
            provider = self.classifier.provider_name(),
            "starting run"
        );

        if !pending.is_empty() {
            let scheduler = BatchScheduler::new(
                self.config.batch.clone(),
                Arc::clone(&self.classifier),
                self.cache.clone(),
                self.scorer.clone(),
            )?
            .with_force_overwrite(self.config.refresh)
            .with_stats(Arc::clone(&stats))
            .with_cancel(self.cancel.clone());

            let live = scheduler.run(&pending).await;
            for (item, outcome) in pending.iter().zip(live) {
                resolved.insert(item.fingerprint.clone(), outcome);
            }
        }

        let mut outcomes = Vec::with_capacity(profiles.len());
        for (profile, (fingerprint, _)) in profiles.iter().zip(&extracted) {
            let outcome = match resolved.get(fingerprint) {
                Some(outcome) => outcome.for_profile(&profile.id),
                None => ClassificationOutcome::Failed {
                    profile_id: profile.id.clone(),
                    fingerprint: fingerprint.clone(),
                    kind: FailureKind::Cancelled,
                    message: "profile was never scheduled".into(),
                },
            };
            outcomes.push(outcome);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stats: stats.snapshot(),
            outcomes,
        };
        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            classifier_calls = report.stats.classifier_calls,
            "run finished"
        );
        Ok(report)
    }
}

/// Extracts every profile, rejecting empty ids and ids reused for different content.
fn extract_all(
    profiles: &[ProfileRecord],
) -> Result<Vec<(Fingerprint, EvidenceMap)>, EngineError> {
    let mut by_id: HashMap<&str, Fingerprint> = HashMap::new();
    let mut out = Vec::with_capacity(profiles.len());
    for (index, profile) in profiles.iter().enumerate() {
        if profile.id.trim().is_empty() {
            return Err(EngineError::EmptyProfileId { index });
        }
        let (fingerprint, evidence) = evidence::extract(profile);
        match by_id.get(profile.id.as_str()) {
            Some(existing) if *existing != fingerprint => {
                return Err(EngineError::DuplicateProfileId {
                    id: profile.id.clone(),
                })
            }
            Some(_) => {}
            None => {
                by_id.insert(&profile.id, fingerprint.clone());
            }
        }
        out.push((fingerprint, evidence));
    }
    Ok(out)
}

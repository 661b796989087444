//! BatchScheduler: drives cache misses through the classifier.
//!
//! Batches run strictly one after another. A batch that keeps failing at
//! transport level is retried as a whole, then given up on; members whose
//! verdict came back invalid are retried one by one. Every valid verdict is
//! scored and written through to the cache before the next batch starts.

pub mod retry;
pub mod stats;

pub use stats::{CancelFlag, RunStats, RunStatsSnapshot};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classifier::{BatchItem, BatchRequest, Classifier, ClassifierError};
use crate::config::BatchConfig;
use crate::errors::{ConfigError, FailureKind, ParseErrorKind};
use crate::model::{
    CachedResult, ClassificationOutcome, ClassificationVerdict, EvidenceMap, Fingerprint,
    ProfileRecord, ResultSource,
};
use crate::reconcile::{reconcile, Reconciliation};
use crate::scoring::Scorer;
use crate::storage::{ClassificationCache, PutOutcome};

/// One cache miss awaiting classification.
#[derive(Debug, Clone)]
pub struct PendingItem<'a> {
    pub profile: &'a ProfileRecord,
    pub fingerprint: Fingerprint,
    pub evidence: EvidenceMap,
}

impl<'a> PendingItem<'a> {
    pub fn id(&self) -> &'a str {
        &self.profile.id
    }

    fn as_batch_item(&self) -> BatchItem<'_> {
        BatchItem {
            id: &self.profile.id,
            profile: self.profile,
            fingerprint: &self.fingerprint,
            evidence: &self.evidence,
        }
    }
}

/// Why a whole request was given up on.
#[derive(Debug, Clone)]
struct RequestFailure {
    kind: FailureKind,
    message: String,
    retryable: bool,
}

pub struct BatchScheduler {
    config: BatchConfig,
    classifier: Arc<dyn Classifier>,
    cache: ClassificationCache,
    scorer: Scorer,
    force_overwrite: bool,
    stats: Arc<RunStats>,
    cancel: CancelFlag,
}

impl BatchScheduler {
    pub fn new(
        config: BatchConfig,
        classifier: Arc<dyn Classifier>,
        cache: ClassificationCache,
        scorer: Scorer,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier,
            cache,
            scorer,
            force_overwrite: false,
            stats: RunStats::new(),
            cancel: CancelFlag::new(),
        })
    }

    /// Replace stored results instead of treating divergence as a violation.
    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    /// Classifies `pending`, returning one outcome per item in input order.
    pub async fn run(&self, pending: &[PendingItem<'_>]) -> Vec<ClassificationOutcome> {
        let mut outcomes = Vec::with_capacity(pending.len());
        let total_batches = pending.len().div_ceil(self.config.batch_size);

        for (index, group) in pending.chunks(self.config.batch_size).enumerate() {
            let batch_id = format!("batch-{:04}", index + 1);

            if self.cancel.is_cancelled() {
                warn!(batch = %batch_id, skipped = group.len(), "run cancelled, skipping batch");
                self.stats.record_failed(group.len() as u64);
                outcomes.extend(group.iter().map(|item| {
                    failed(item, FailureKind::Cancelled, "run cancelled before batch started")
                }));
                continue;
            }

            if index > 0 && self.config.inter_batch_delay_ms > 0 {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }

            info!(
                batch = %batch_id,
                batch_num = index + 1,
                total_batches,
                size = group.len(),
                "classifying batch"
            );
            outcomes.extend(self.run_batch(&batch_id, group).await);
        }
        outcomes
    }

    async fn run_batch(
        &self,
        batch_id: &str,
        group: &[PendingItem<'_>],
    ) -> Vec<ClassificationOutcome> {
        let request = BatchRequest::new(
            batch_id,
            group.iter().map(PendingItem::as_batch_item).collect(),
        );

        let reconciliation = match self
            .call_with_retry(&request, self.config.max_batch_attempts)
            .await
        {
            Ok(rec) => rec,
            Err(failure) => {
                error!(
                    batch = %batch_id,
                    kind = %failure.kind,
                    error = %failure.message,
                    "batch failed after retries"
                );
                self.stats.record_failed(group.len() as u64);
                return group
                    .iter()
                    .map(|item| failed(item, failure.kind, &failure.message))
                    .collect();
            }
        };

        let mut results = reconciliation.into_items().into_iter();
        let mut outcomes = Vec::with_capacity(group.len());
        for item in group {
            // reconcile answers for exactly the requested ids, in order
            let verdict = match results.next() {
                Some((id, result)) if id == item.id() => result,
                _ => Err(ParseErrorKind::MissingResponse),
            };
            let outcome = match verdict {
                Ok(verdict) => self.commit(item, verdict).await,
                Err(kind) => {
                    debug!(
                        batch = %batch_id,
                        profile = %item.id(),
                        kind = %FailureKind::from(kind),
                        "invalid verdict, retrying individually"
                    );
                    self.retry_item(batch_id, item, kind).await
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Individual fallback for a member whose batched verdict was invalid.
    async fn retry_item(
        &self,
        batch_id: &str,
        item: &PendingItem<'_>,
        first_error: ParseErrorKind,
    ) -> ClassificationOutcome {
        let request = BatchRequest::new(
            format!("{}/{}", batch_id, item.id()),
            vec![item.as_batch_item()],
        );
        let mut last_kind = FailureKind::from(first_error);
        let mut last_message = format!("batched verdict invalid: {}", last_kind);

        for attempt in 1..=self.config.max_item_attempts {
            self.stats.record_retry();
            match self.call_with_retry(&request, 1).await {
                Ok(rec) => match single_result(&rec, item.id()) {
                    Ok(verdict) => return self.commit(item, verdict).await,
                    Err(kind) => {
                        last_kind = kind.into();
                        last_message = format!("individual verdict invalid: {}", last_kind);
                    }
                },
                Err(failure) => {
                    last_kind = failure.kind;
                    last_message = failure.message;
                    if !failure.retryable {
                        break;
                    }
                }
            }
            warn!(
                profile = %item.id(),
                attempt,
                max_attempts = self.config.max_item_attempts,
                kind = %last_kind,
                "individual retry failed"
            );
            if attempt < self.config.max_item_attempts {
                tokio::time::sleep(retry::backoff_delay(&self.config, attempt, None)).await;
            }
        }

        self.stats.record_failed(1);
        failed(item, last_kind, &last_message)
    }

    /// Calls the classifier until the response is readable, up to
    /// `max_attempts` calls in total.
    async fn call_with_retry(
        &self,
        request: &BatchRequest<'_>,
        max_attempts: u32,
    ) -> Result<Reconciliation, RequestFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.stats.record_call();

            let outcome = tokio::time::timeout(
                self.config.call_timeout(),
                self.classifier.classify(request),
            )
            .await;

            let (err, kind) = match outcome {
                Ok(Ok(text)) => {
                    let rec = reconcile(request, &text);
                    if !rec.batch_unparseable() {
                        return Ok(rec);
                    }
                    (
                        ClassifierError::retryable("response is not structured data"),
                        FailureKind::UnparseableBatch,
                    )
                }
                Ok(Err(e)) => (e, FailureKind::ApiError),
                Err(_elapsed) => (
                    ClassifierError::retryable(format!(
                        "call exceeded deadline of {}ms",
                        self.config.call_timeout_ms
                    )),
                    FailureKind::ApiError,
                ),
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(RequestFailure {
                    kind,
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                });
            }

            let backoff = retry::backoff_delay(&self.config, attempt, err.retry_after());
            self.stats.record_retry();
            warn!(
                batch = %request.batch_id,
                error = %err,
                retry = attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "retrying batch"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Scores a valid verdict and writes it through to the cache.
    async fn commit(
        &self,
        item: &PendingItem<'_>,
        verdicts: ClassificationVerdict,
    ) -> ClassificationOutcome {
        let card = self.scorer.score(&verdicts);
        let result = CachedResult {
            fingerprint: item.fingerprint.clone(),
            verdicts,
            category_scores: card.category_scores,
            final_label: card.final_label,
            computed_at: Utc::now(),
        };

        match self
            .cache
            .put_async(result.clone(), self.force_overwrite)
            .await
        {
            Ok(PutOutcome::Unchanged) => {
                // an identical payload was committed earlier; report the stored row
                self.stats.record_committed();
                let stored = self
                    .cache
                    .get_async(item.fingerprint.clone())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(result);
                success(item, stored)
            }
            Ok(_) => {
                self.stats.record_committed();
                debug!(
                    profile = %item.id(),
                    fingerprint = %item.fingerprint.short(),
                    label = %result.final_label,
                    "committed"
                );
                success(item, result)
            }
            Err(e) => {
                let kind = FailureKind::from(&e);
                if kind == FailureKind::ConsistencyViolation {
                    error!(
                        profile = %item.id(),
                        fingerprint = %item.fingerprint,
                        error = %e,
                        "cache consistency violation"
                    );
                } else {
                    warn!(profile = %item.id(), error = %e, "cache write failed");
                }
                self.stats.record_failed(1);
                failed(item, kind, &e.to_string())
            }
        }
    }
}

fn single_result(rec: &Reconciliation, id: &str) -> Result<ClassificationVerdict, ParseErrorKind> {
    match rec.get(id) {
        Some(result) => result.clone(),
        None => Err(ParseErrorKind::MissingResponse),
    }
}

fn success(item: &PendingItem<'_>, result: CachedResult) -> ClassificationOutcome {
    ClassificationOutcome::Success {
        profile_id: item.id().to_string(),
        source: ResultSource::Live,
        result,
    }
}

fn failed(item: &PendingItem<'_>, kind: FailureKind, message: &str) -> ClassificationOutcome {
    ClassificationOutcome::Failed {
        profile_id: item.id().to_string(),
        fingerprint: item.fingerprint.clone(),
        kind,
        message: message.to_string(),
    }
}

//! End-to-end engine behaviour against the scriptable fake classifier:
//! idempotence, batch retry ceilings, partial-failure isolation,
//! exclusion overrides, forced refresh, cancellation, storage failures
//! and policy changes over a warm cache.

use async_trait::async_trait;
use prospect_core::classifier::fake::{FakeClassifier, FakeStep};
use prospect_core::classifier::BatchRequest;
use prospect_core::{
    evidence, BatchScheduler, CachedResult, CancelFlag, ClassificationCache,
    ClassificationOutcome, ClassificationVerdict, Classifier, ClassifierError, CriterionCode,
    CriterionVerdict, Engine, EngineConfig, FailureKind, FinalLabel, PendingItem, ProfileRecord,
    ResultSource, Scorer,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("prospect_core=debug")
        .try_init();
}

fn fast_config(batch_size: usize) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.batch.batch_size = batch_size;
    cfg.batch.call_timeout_ms = 50;
    cfg.batch.backoff_base_ms = 1;
    cfg.batch.backoff_max_ms = 5;
    cfg
}

fn protein_profile(id: &str) -> ProfileRecord {
    ProfileRecord::new(id)
        .with_name(format!("Researcher {id}"))
        .with_institution("Universidade Federal")
        .with_keywords("ELISA, Western blot, HPLC, cromatografia, proteômica")
}

fn profiles(n: usize) -> Vec<ProfileRecord> {
    let fields = [
        "CRISPR; clonagem molecular",
        "cultura celular; biorreatores",
        "cell-free protein synthesis",
        "ELISA; biocatálise",
        "engenharia de tecidos",
    ];
    (0..n)
        .map(|i| {
            ProfileRecord::new(format!("p{i}"))
                .with_keywords(fields[i % fields.len()])
                .with_research_lines(format!("linha {i}"))
        })
        .collect()
}

fn engine(cfg: EngineConfig, cache: ClassificationCache, fake: &Arc<FakeClassifier>) -> Engine {
    Engine::new(cfg, cache, fake.clone()).unwrap()
}

#[tokio::test]
async fn second_run_is_free_and_identical() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let input = profiles(5);

    let fake1 = Arc::new(FakeClassifier::auto());
    let first = engine(fast_config(2), ClassificationCache::open(&path).unwrap(), &fake1)
        .run(&input)
        .await
        .unwrap();
    assert!(first.all_succeeded());
    assert_eq!(fake1.calls(), 3);

    // new process: fresh engine and classifier over the same store
    let fake2 = Arc::new(FakeClassifier::auto());
    let second = engine(fast_config(2), ClassificationCache::open(&path).unwrap(), &fake2)
        .run(&input)
        .await
        .unwrap();
    assert_eq!(fake2.calls(), 0);
    assert_eq!(second.stats.cache_hits, 5);
    for (a, b) in first.outcomes.iter().zip(&second.outcomes) {
        assert_eq!(a.result(), b.result());
        assert!(matches!(
            b,
            ClassificationOutcome::Success {
                source: ResultSource::Cache,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn batches_preserve_input_order() {
    let fake = Arc::new(FakeClassifier::auto());
    let input = profiles(5);
    let report = engine(fast_config(2), ClassificationCache::memory().unwrap(), &fake)
        .run(&input)
        .await
        .unwrap();

    let batches: Vec<Vec<String>> = fake.requests().into_iter().map(|r| r.ids).collect();
    assert_eq!(
        batches,
        vec![
            vec!["p0".to_string(), "p1".to_string()],
            vec!["p2".to_string(), "p3".to_string()],
            vec!["p4".to_string()],
        ]
    );
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.profile_id()).collect();
    assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
}

#[tokio::test]
async fn two_timeouts_then_success_within_ceiling() {
    init_tracing();
    let fake = Arc::new(FakeClassifier::scripted([
        FakeStep::Hang(Duration::from_millis(500)),
        FakeStep::Hang(Duration::from_millis(500)),
        FakeStep::Auto,
    ]));
    let report = engine(fast_config(3), ClassificationCache::memory().unwrap(), &fake)
        .run(&profiles(3))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(report.all_succeeded());
    assert_eq!(fake.calls(), 3);
    assert_eq!(report.stats.retries, 2);
}

#[tokio::test]
async fn exhausted_batch_fails_alone_and_next_batch_runs() {
    let fake = Arc::new(FakeClassifier::scripted([
        FakeStep::Fail(ClassifierError::retryable("503")),
        FakeStep::Hang(Duration::from_millis(500)),
        FakeStep::Fail(ClassifierError::Retryable {
            message: "429".into(),
            retry_after: Some(Duration::from_millis(2)),
        }),
    ]));
    let cache = ClassificationCache::memory().unwrap();
    let report = engine(fast_config(2), cache.clone(), &fake)
        .run(&profiles(4))
        .await
        .unwrap();

    // three attempts for batch one, never a fourth, then one call for batch two
    assert_eq!(fake.calls(), 4);
    assert_eq!(report.outcomes[0].failure_kind(), Some(FailureKind::ApiError));
    assert_eq!(report.outcomes[1].failure_kind(), Some(FailureKind::ApiError));
    assert!(report.outcomes[2].is_success());
    assert!(report.outcomes[3].is_success());
    assert_eq!(cache.len().unwrap(), 2);

    let summary = report.summary();
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.by_failure[&FailureKind::ApiError], 2);
}

#[tokio::test]
async fn terminal_error_is_not_retried() {
    let fake = Arc::new(FakeClassifier::scripted([FakeStep::Fail(
        ClassifierError::terminal("HTTP 403: key rejected"),
    )]));
    let report = engine(fast_config(3), ClassificationCache::memory().unwrap(), &fake)
        .run(&profiles(3))
        .await
        .unwrap();
    assert_eq!(fake.calls(), 1);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.failure_kind() == Some(FailureKind::ApiError)));
}

#[tokio::test]
async fn free_text_responses_exhaust_as_unparseable() {
    let fake = Arc::new(FakeClassifier::scripted([
        FakeStep::Respond("I cannot classify these.".into()),
        FakeStep::Respond("```\nnope\n```".into()),
        FakeStep::Respond("{\"profiles\": [".into()),
    ]));
    let report = engine(fast_config(2), ClassificationCache::memory().unwrap(), &fake)
        .run(&profiles(2))
        .await
        .unwrap();
    assert_eq!(fake.calls(), 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.failure_kind() == Some(FailureKind::UnparseableBatch)));
}

#[tokio::test]
async fn missing_member_is_isolated_from_valid_siblings() {
    let missing = vec!["p1".to_string()];
    let fake = Arc::new(FakeClassifier::scripted([
        FakeStep::AutoWithout(missing.clone()),
        FakeStep::AutoWithout(missing.clone()),
        FakeStep::AutoWithout(missing),
    ]));
    let cache = ClassificationCache::memory().unwrap();
    let report = engine(fast_config(3), cache.clone(), &fake)
        .run(&profiles(3))
        .await
        .unwrap();

    assert!(report.outcomes[0].is_success());
    assert_eq!(
        report.outcomes[1].failure_kind(),
        Some(FailureKind::MissingResponse)
    );
    assert!(report.outcomes[2].is_success());
    assert_eq!(cache.len().unwrap(), 2);

    // one batch call plus two individual attempts, all for p1 only
    let requests = fake.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].ids.len(), 3);
    for r in &requests[1..] {
        assert_eq!(r.ids, vec!["p1".to_string()]);
    }
}

#[tokio::test]
async fn incomplete_member_recovers_on_individual_retry() {
    let fake = Arc::new(FakeClassifier::scripted([FakeStep::AutoIncomplete(vec![
        "p0".to_string(),
    ])]));
    let report = engine(fast_config(2), ClassificationCache::memory().unwrap(), &fake)
        .run(&profiles(2))
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert_eq!(fake.calls(), 2);
    assert_eq!(fake.requests()[1].ids, vec!["p0".to_string()]);
}

#[tokio::test]
async fn strong_protein_profile_is_strategic_unless_excluded() {
    let fake = Arc::new(FakeClassifier::auto());
    let a = protein_profile("A");
    let b = protein_profile("B").with_research_lines("Psicologia do desenvolvimento");
    let report = engine(fast_config(2), ClassificationCache::memory().unwrap(), &fake)
        .run(&[a, b])
        .await
        .unwrap();

    let ra = report.outcomes[0].result().unwrap();
    assert!(ra.category_score(CriterionCode::ProteinProduction) >= 8.0);
    assert_eq!(ra.final_label, FinalLabel::Strategic);

    let rb = report.outcomes[1].result().unwrap();
    assert!(rb.verdicts.is_asserted(CriterionCode::NonBiotech));
    assert_eq!(rb.final_label, FinalLabel::Excluded);

    let seg = report.segmentation();
    let pa: Vec<&str> = seg
        .category(CriterionCode::ProteinProduction)
        .iter()
        .map(|e| e.profile_id.as_str())
        .collect();
    assert_eq!(pa, vec!["A"]);
    assert!(!seg.in_any_category("B"));
    assert!(seg.viable.iter().all(|e| e.profile_id != "B"));
    assert_eq!(seg.excluded[0].profile_id, "B");
}

#[tokio::test]
async fn refresh_reclassifies_and_overwrites() {
    let cache = ClassificationCache::memory().unwrap();
    let input = vec![protein_profile("A")];

    let fake = Arc::new(FakeClassifier::auto());
    let first = engine(fast_config(1), cache.clone(), &fake)
        .run(&input)
        .await
        .unwrap();
    assert_eq!(
        first.outcomes[0].result().unwrap().final_label,
        FinalLabel::Strategic
    );

    let excluded = r#"{"profiles":[{"id":"A","PA":true,"S":false,"C":false,"F":false,"N1":true,"N2":false}]}"#;
    let fake = Arc::new(FakeClassifier::scripted([FakeStep::Respond(excluded.into())]));
    let mut cfg = fast_config(1);
    cfg.refresh = true;
    let second = engine(cfg, cache.clone(), &fake).run(&input).await.unwrap();
    assert_eq!(fake.calls(), 1);
    assert_eq!(
        second.outcomes[0].result().unwrap().final_label,
        FinalLabel::Excluded
    );
    let stored = cache
        .get(second.outcomes[0].fingerprint())
        .unwrap()
        .unwrap();
    assert_eq!(stored.final_label, FinalLabel::Excluded);
}

/// Cancels the run as soon as its first call returns.
struct CancelAfterFirstCall {
    inner: FakeClassifier,
    cancel: CancelFlag,
}

#[async_trait]
impl Classifier for CancelAfterFirstCall {
    async fn classify(&self, request: &BatchRequest<'_>) -> Result<String, ClassifierError> {
        let out = self.inner.classify(request).await;
        self.cancel.cancel();
        out
    }

    fn provider_name(&self) -> &'static str {
        "cancel-after-first"
    }
}

#[tokio::test]
async fn cancellation_stops_between_batches() {
    let cancel = CancelFlag::new();
    let classifier = Arc::new(CancelAfterFirstCall {
        inner: FakeClassifier::auto(),
        cancel: cancel.clone(),
    });
    let cache = ClassificationCache::memory().unwrap();
    let engine = Engine::new(fast_config(1), cache.clone(), classifier.clone())
        .unwrap()
        .with_cancel(cancel);

    let report = engine.run(&profiles(3)).await.unwrap();
    assert!(report.outcomes[0].is_success());
    assert_eq!(
        report.outcomes[1].failure_kind(),
        Some(FailureKind::Cancelled)
    );
    assert_eq!(
        report.outcomes[2].failure_kind(),
        Some(FailureKind::Cancelled)
    );
    assert_eq!(classifier.inner.calls(), 1);
    // the committed member is durable; nothing partial was written
    assert_eq!(cache.len().unwrap(), 1);
}

#[tokio::test]
async fn padded_id_is_classified_live() {
    let fake = Arc::new(FakeClassifier::auto());
    let input = vec![ProfileRecord::new(" p1 ").with_keywords("ELISA")];
    let report = engine(fast_config(5), ClassificationCache::memory().unwrap(), &fake)
        .run(&input)
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn cache_hit_is_rescored_under_current_policy() {
    let cache = ClassificationCache::memory().unwrap();
    let input = vec![ProfileRecord::new("elisa").with_keywords("ELISA")];

    let fake1 = Arc::new(FakeClassifier::auto());
    let first = engine(fast_config(5), cache.clone(), &fake1)
        .run(&input)
        .await
        .unwrap();
    let stored = first.outcomes[0].result().unwrap().clone();
    assert_eq!(stored.final_label, FinalLabel::Priority);

    let mut strict = fast_config(5);
    strict.scoring.strategic_threshold = 9.9;
    strict.scoring.priority_threshold = 9.5;
    strict.scoring.regular_threshold = 9.0;
    let fake2 = Arc::new(FakeClassifier::auto());
    let second = engine(strict, cache.clone(), &fake2)
        .run(&input)
        .await
        .unwrap();

    assert_eq!(fake2.calls(), 0);
    let rescored = second.outcomes[0].result().unwrap();
    assert_eq!(rescored.final_label, FinalLabel::LowPriority);
    assert_eq!(rescored.verdicts, stored.verdicts);
    assert_eq!(rescored.category_scores, stored.category_scores);
    // the ledger row keeps what was committed
    let row = cache.get(&stored.fingerprint).unwrap().unwrap();
    assert_eq!(row.final_label, FinalLabel::Priority);
}

#[tokio::test]
async fn failed_write_is_isolated_to_its_member() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let cache = ClassificationCache::open(&path).unwrap();
    let input = profiles(3);
    let (blocked, _) = evidence::extract(&input[1]);

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute_batch(&format!(
        "CREATE TRIGGER fail_p1 BEFORE INSERT ON classifications
         WHEN NEW.fingerprint = '{}'
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        blocked.as_str()
    ))
    .unwrap();
    drop(raw);

    let fake = Arc::new(FakeClassifier::auto());
    let report = engine(fast_config(2), cache.clone(), &fake)
        .run(&input)
        .await
        .unwrap();

    assert!(report.outcomes[0].is_success());
    assert_eq!(
        report.outcomes[1].failure_kind(),
        Some(FailureKind::StorageError)
    );
    assert!(report.outcomes[2].is_success());
    assert_eq!(fake.calls(), 2);
    assert_eq!(cache.len().unwrap(), 2);
    assert!(cache.get(&blocked).unwrap().is_none());
}

#[tokio::test]
async fn divergent_stored_row_fails_only_that_member() {
    init_tracing();
    let cfg = fast_config(2);
    let cache = ClassificationCache::memory().unwrap();
    let input = profiles(3);
    let pending: Vec<PendingItem<'_>> = input
        .iter()
        .map(|profile| {
            let (fingerprint, evidence) = evidence::extract(profile);
            PendingItem {
                profile,
                fingerprint,
                evidence,
            }
        })
        .collect();

    // a row committed earlier with verdicts the classifier will not repeat
    let criteria: BTreeMap<CriterionCode, CriterionVerdict> = CriterionCode::ALL
        .iter()
        .map(|code| {
            let mut v = CriterionVerdict::asserted(true);
            v.confidence = Some(0.1);
            v.justification = "seeded".into();
            (*code, v)
        })
        .collect();
    let verdicts = ClassificationVerdict::from_complete(criteria).unwrap();
    let card = Scorer::default().score(&verdicts);
    let seeded = CachedResult {
        fingerprint: pending[1].fingerprint.clone(),
        verdicts,
        category_scores: card.category_scores,
        final_label: card.final_label,
        computed_at: chrono::Utc::now(),
    };
    cache.put(&seeded.fingerprint, &seeded, false).unwrap();

    let fake = Arc::new(FakeClassifier::auto());
    let scheduler =
        BatchScheduler::new(cfg.batch, fake.clone(), cache.clone(), Scorer::default()).unwrap();
    let outcomes = scheduler.run(&pending).await;

    assert!(outcomes[0].is_success());
    assert_eq!(
        outcomes[1].failure_kind(),
        Some(FailureKind::ConsistencyViolation)
    );
    assert!(outcomes[2].is_success());
    assert_eq!(fake.calls(), 2);
    // the earlier row is untouched
    assert_eq!(cache.get(&seeded.fingerprint).unwrap(), Some(seeded));
    assert_eq!(cache.len().unwrap(), 3);
}

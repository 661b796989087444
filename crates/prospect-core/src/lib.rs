//! Cached, batched classification engine for researcher profiles.
//!
//! The pipeline is one-directional:
//!
//! ```text
//! ProfileRecord -> evidence::extract -> ClassificationCache::get
//!     hit  -> stored CachedResult
//!     miss -> BatchScheduler -> Classifier -> reconcile -> Scorer -> ClassificationCache::put
//! ```
//!
//! The cache is the ledger of completed work: a run that is interrupted and
//! restarted only pays for profiles that were never committed.
//!
//! # Quick Start
//!
//! ```no_run
//! use prospect_core::classifier::fake::FakeClassifier;
//! use prospect_core::config::EngineConfig;
//! use prospect_core::engine::Engine;
//! use prospect_core::source::{ProfileSource, VecSource};
//! use prospect_core::storage::ClassificationCache;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = ClassificationCache::open(std::path::Path::new("prospect-cache.db"))?;
//! let classifier = Arc::new(FakeClassifier::auto());
//! let engine = Engine::new(EngineConfig::default(), cache, classifier)?;
//!
//! let profiles = VecSource::new(vec![]).profiles()?;
//! let report = engine.run(&profiles).await?;
//! println!("{} outcomes", report.outcomes.len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod errors;
pub mod evidence;
pub mod fingerprint;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod scoring;
pub mod source;
pub mod storage;

pub use batch::{BatchScheduler, CancelFlag, PendingItem, RunStats};
pub use classifier::{Classifier, ClassifierError};
pub use config::{load_config, EngineConfig};
pub use engine::{Engine, RunReport};
pub use errors::{CacheError, ConfigError, EngineError, FailureKind, ParseErrorKind, SourceError};
pub use model::{
    CachedResult, ClassificationOutcome, ClassificationVerdict, CriterionCode, CriterionVerdict,
    EvidenceMap, FinalLabel, Fingerprint, ProfileRecord, ResultSource,
};
pub use report::{RunSummary, Segmentation};
pub use scoring::{ScoreCard, Scorer, ScoringPolicy};
pub use source::{JsonLinesSource, ProfileSource, VecSource};
pub use storage::ClassificationCache;

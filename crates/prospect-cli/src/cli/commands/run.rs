use anyhow::Context;
use chrono::{DateTime, Utc};
use prospect_core::classifier::fake::FakeClassifier;
use prospect_core::classifier::gemini::GeminiClassifier;
use prospect_core::config::ProviderKind;
use prospect_core::{
    load_config, ClassificationCache, ClassificationOutcome, Classifier, ConfigError, Engine,
    EngineConfig, JsonLinesSource, ProfileSource, RunReport, RunSummary, Segmentation,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::super::args::RunArgs;
use crate::exit_codes;

/// JSON document written by `prospect run`.
#[derive(Serialize)]
struct ReportDocument<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    summary: RunSummary,
    segmentation: Segmentation,
    outcomes: &'a [ClassificationOutcome],
}

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let cfg = match build_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let profiles = match JsonLinesSource::new(&args.input).profiles() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("input error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let classifier = match build_classifier(&cfg) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let cache = match ClassificationCache::open(&cfg.cache_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "failed to open cache at {}: {e}",
                cfg.cache_path.display()
            );
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let engine = Engine::new(cfg, cache, classifier)?;
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the in-flight batch");
            cancel.cancel();
        }
    });

    let report = match engine.run(&profiles).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    write_report(&report, args.output.as_deref())?;

    let summary = report.summary();
    eprintln!(
        "classified {}/{} profiles ({} cached, {} live, {} failed, {} classifier calls)",
        summary.succeeded,
        summary.total,
        summary.from_cache,
        summary.live,
        summary.failed,
        summary.classifier_calls
    );

    Ok(if report.all_succeeded() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    })
}

/// Loads the config file and applies flag overrides.
fn build_config(args: &RunArgs) -> Result<EngineConfig, ConfigError> {
    let mut cfg = load_config(&args.config)?;
    if let Some(db) = &args.db {
        cfg.cache_path = db.clone();
    }
    if let Some(n) = args.batch_size {
        cfg.batch.batch_size = n;
    }
    if args.refresh {
        cfg.refresh = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_classifier(cfg: &EngineConfig) -> Result<Arc<dyn Classifier>, ConfigError> {
    Ok(match cfg.classifier.provider {
        ProviderKind::Gemini => Arc::new(GeminiClassifier::from_config(&cfg.classifier)?),
        ProviderKind::Fake => Arc::new(FakeClassifier::auto()),
    })
}

fn write_report(report: &RunReport, output: Option<&Path>) -> anyhow::Result<()> {
    let doc = ReportDocument {
        run_id: &report.run_id,
        started_at: report.started_at,
        finished_at: report.finished_at,
        summary: report.summary(),
        segmentation: report.segmentation(),
        outcomes: &report.outcomes,
    };
    let json = serde_json::to_string_pretty(&doc)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
        }
        None => println!("{json}"),
    }
    Ok(())
}

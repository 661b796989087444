use prospect_core::{ClassificationCache, Fingerprint};
use std::path::Path;

use crate::exit_codes;

fn open(db: &Path) -> Option<ClassificationCache> {
    if !db.exists() {
        eprintln!("no cache at {}", db.display());
        return None;
    }
    match ClassificationCache::open(db) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("failed to open cache at {}: {e}", db.display());
            None
        }
    }
}

pub(crate) fn stats(db: &Path) -> anyhow::Result<i32> {
    let Some(cache) = open(db) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let stats = cache.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(exit_codes::SUCCESS)
}

pub(crate) fn show(db: &Path, fingerprint: &str) -> anyhow::Result<i32> {
    let Some(cache) = open(db) else {
        return Ok(exit_codes::CONFIG_ERROR);
    };
    match cache.get(&Fingerprint::from_hex(fingerprint))? {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(exit_codes::SUCCESS)
        }
        None => {
            eprintln!("no cached result for {fingerprint}");
            Ok(exit_codes::PARTIAL_FAILURE)
        }
    }
}

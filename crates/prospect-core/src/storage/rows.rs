use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use crate::errors::CacheError;
use crate::model::{CachedResult, Fingerprint, FinalLabel};

/// Serialized column values of one `classifications` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedRow {
    pub verdict_set: String,
    pub category_scores: String,
    pub final_label: String,
    pub computed_at: String,
}

impl EncodedRow {
    pub(crate) fn encode(result: &CachedResult) -> Result<Self, CacheError> {
        Ok(Self {
            verdict_set: serde_json::to_string(&result.verdicts)?,
            category_scores: serde_json::to_string(&result.category_scores)?,
            final_label: result.final_label.as_str().to_string(),
            computed_at: result
                .computed_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        })
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            verdict_set: row.get(0)?,
            category_scores: row.get(1)?,
            final_label: row.get(2)?,
            computed_at: row.get(3)?,
        })
    }

    /// First payload column that differs, ignoring `computed_at`.
    pub(crate) fn diverging_field(&self, other: &EncodedRow) -> Option<&'static str> {
        if self.verdict_set != other.verdict_set {
            Some("verdict_set")
        } else if self.category_scores != other.category_scores {
            Some("category_scores")
        } else if self.final_label != other.final_label {
            Some("final_label")
        } else {
            None
        }
    }

    pub(crate) fn decode(self, fingerprint: &str) -> Result<CachedResult, CacheError> {
        let final_label: FinalLabel = self
            .final_label
            .parse()
            .map_err(|e: String| CacheError::Storage(format!("row {}: {}", fingerprint, e)))?;
        let computed_at = DateTime::parse_from_rfc3339(&self.computed_at)
            .map_err(|e| {
                CacheError::Storage(format!("row {}: bad computed_at: {}", fingerprint, e))
            })?
            .with_timezone(&Utc);
        Ok(CachedResult {
            fingerprint: Fingerprint::from_hex(fingerprint),
            verdicts: serde_json::from_str(&self.verdict_set)?,
            category_scores: serde_json::from_str(&self.category_scores)?,
            final_label,
            computed_at,
        })
    }
}

//! Error types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification cache errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Underlying store I/O failed (open, read, write, decode).
    #[error("storage error: {0}")]
    Storage(String),

    /// Attempted to overwrite an existing fingerprint with a different payload.
    #[error("consistency violation for {fingerprint}: stored {field} differs")]
    ConsistencyViolation { fingerprint: String, field: String },
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Storage(format!("payload encoding: {}", e))
    }
}

/// Terminal failure taxonomy carried by failed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport or rate-limit failure that exhausted the batch retry ceiling,
    /// or a terminal classifier error.
    ApiError,
    /// Whole response never parsed as structured data.
    UnparseableBatch,
    /// Response carried no entry for this profile.
    MissingResponse,
    /// Entry present but one or more criterion codes missing or malformed.
    IncompleteVerdict,
    /// Cache write failed; the profile stays unresolved.
    StorageError,
    /// Cache refused to overwrite a divergent stored result.
    ConsistencyViolation,
    /// Run aborted before this profile's batch started.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ApiError => "api_error",
            FailureKind::UnparseableBatch => "unparseable_batch",
            FailureKind::MissingResponse => "missing_response",
            FailureKind::IncompleteVerdict => "incomplete_verdict",
            FailureKind::StorageError => "storage_error",
            FailureKind::ConsistencyViolation => "consistency_violation",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&CacheError> for FailureKind {
    fn from(e: &CacheError) -> Self {
        match e {
            CacheError::Storage(_) => FailureKind::StorageError,
            CacheError::ConsistencyViolation { .. } => FailureKind::ConsistencyViolation,
        }
    }
}

/// Per-item reconciliation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnparseableBatch,
    MissingResponse,
    IncompleteVerdict,
}

impl From<ParseErrorKind> for FailureKind {
    fn from(kind: ParseErrorKind) -> Self {
        match kind {
            ParseErrorKind::UnparseableBatch => FailureKind::UnparseableBatch,
            ParseErrorKind::MissingResponse => FailureKind::MissingResponse,
            ParseErrorKind::IncompleteVerdict => FailureKind::IncompleteVerdict,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// Errors reading profiles from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Errors that abort a whole run before or outside per-profile accounting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("duplicate profile id '{id}' with different content")]
    DuplicateProfileId { id: String },

    #[error("profile at position {index} has an empty id")]
    EmptyProfileId { index: usize },
}

//! The external classification oracle, as a capability.
//!
//! A [`Classifier`] takes one batched request and answers with raw response
//! text; interpreting that text is the reconciler's job. Failures come in
//! two classes so the scheduler can decide between retrying and giving up.

pub mod fake;
pub mod gemini;
pub mod prompt;

use async_trait::async_trait;
use std::time::Duration;

use crate::model::{EvidenceMap, Fingerprint, ProfileRecord};

/// Classifier call failure.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// Transport failure, rate limit, timeout, server error.
    #[error("retryable classifier error: {message}")]
    Retryable {
        message: String,
        /// Server-requested delay before the next attempt.
        retry_after: Option<Duration>,
    },

    /// Rejected request, bad credentials, unknown model.
    #[error("terminal classifier error: {message}")]
    Terminal { message: String },
}

impl ClassifierError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ClassifierError::Retryable {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        ClassifierError::Terminal {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifierError::Retryable { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClassifierError::Retryable { retry_after, .. } => *retry_after,
            ClassifierError::Terminal { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        ClassifierError::retryable(format!("transport: {}", e))
    }
}

/// One profile inside a batch request.
#[derive(Debug, Clone)]
pub struct BatchItem<'a> {
    /// Correlation key; the profile id of the representative profile.
    pub id: &'a str,
    pub profile: &'a ProfileRecord,
    pub fingerprint: &'a Fingerprint,
    pub evidence: &'a EvidenceMap,
}

/// A bounded, ordered group of profiles submitted in one call.
#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub batch_id: String,
    pub items: Vec<BatchItem<'a>>,
}

impl<'a> BatchRequest<'a> {
    pub fn new(batch_id: impl Into<String>, items: Vec<BatchItem<'a>>) -> Self {
        Self {
            batch_id: batch_id.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.items.iter().map(|i| i.id)
    }

    /// Renders the prompt text for this request.
    pub fn prompt(&self) -> String {
        prompt::render(self)
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify every item of `request`, returning the raw response text.
    async fn classify(&self, request: &BatchRequest<'_>) -> Result<String, ClassifierError>;

    fn provider_name(&self) -> &'static str;
}

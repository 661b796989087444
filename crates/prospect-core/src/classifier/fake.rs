//! Scriptable in-process classifier for tests and offline dry runs.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{BatchRequest, Classifier, ClassifierError};
use crate::model::CriterionCode;

/// One scripted reaction to a `classify` call.
#[derive(Debug, Clone)]
pub enum FakeStep {
    /// Return this raw text verbatim.
    Respond(String),
    /// Return the evidence-derived response.
    Auto,
    /// Evidence-derived response with these ids left out.
    AutoWithout(Vec<String>),
    /// Evidence-derived response where these ids lack the `N2` code.
    AutoIncomplete(Vec<String>),
    Fail(ClassifierError),
    /// Sleep this long, then answer like `Auto`.
    Hang(Duration),
}

/// What a call was asked to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub batch_id: String,
    pub ids: Vec<String>,
}

/// Plays scripted steps in order, then answers every further call with
/// the evidence-derived response: a criterion is asserted exactly when
/// local evidence was found for it.
#[derive(Debug, Default)]
pub struct FakeClassifier {
    steps: Mutex<VecDeque<FakeStep>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn scripted(steps: impl IntoIterator<Item = FakeStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, step: FakeStep) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_step(&self) -> FakeStep {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(FakeStep::Auto)
    }

    /// Evidence-derived response for `request`.
    pub fn auto_response(
        request: &BatchRequest<'_>,
        omit: &[String],
        incomplete: &[String],
    ) -> String {
        let profiles: Vec<Value> = request
            .items
            .iter()
            .filter(|item| !omit.iter().any(|o| o == item.id))
            .map(|item| {
                let mut entry = Map::new();
                entry.insert("id".into(), json!(item.id));
                for code in CriterionCode::ALL {
                    if code == CriterionCode::NonBiotech
                        && incomplete.iter().any(|i| i == item.id)
                    {
                        continue;
                    }
                    let n = item.evidence.count(code);
                    entry.insert(
                        code.as_str().into(),
                        json!({
                            "value": n > 0,
                            "confidence": if n > 0 { 0.9 } else { 0.8 },
                            "justification": format!("{} evidence span(s)", n),
                        }),
                    );
                }
                Value::Object(entry)
            })
            .collect();
        json!({ "profiles": profiles }).to_string()
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, request: &BatchRequest<'_>) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                batch_id: request.batch_id.clone(),
                ids: request.ids().map(str::to_string).collect(),
            });

        match self.next_step() {
            FakeStep::Respond(text) => Ok(text),
            FakeStep::Auto => Ok(Self::auto_response(request, &[], &[])),
            FakeStep::AutoWithout(omit) => Ok(Self::auto_response(request, &omit, &[])),
            FakeStep::AutoIncomplete(ids) => Ok(Self::auto_response(request, &[], &ids)),
            FakeStep::Fail(e) => Err(e),
            FakeStep::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(Self::auto_response(request, &[], &[]))
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

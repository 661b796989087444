//! Maps a raw batch response onto the profiles of its request.
//!
//! Loosely-shaped JSON stops here: every requested id leaves with either a
//! complete [`ClassificationVerdict`] or a [`ParseErrorKind`].

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::classifier::BatchRequest;
use crate::errors::ParseErrorKind;
use crate::model::{ClassificationVerdict, CriterionCode, CriterionVerdict};

const LIST_KEYS: &[&str] = &["profiles", "results", "clientes"];
const ID_KEYS: &[&str] = &["id", "profile_id"];

/// Per-item outcome of reconciling one response, in request order.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    items: Vec<(String, Result<ClassificationVerdict, ParseErrorKind>)>,
}

impl Reconciliation {
    pub fn get(&self, id: &str) -> Option<&Result<ClassificationVerdict, ParseErrorKind>> {
        self.items.iter().find(|(i, _)| i == id).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<ClassificationVerdict, ParseErrorKind>)> {
        self.items.iter().map(|(i, r)| (i.as_str(), r))
    }

    pub fn into_items(self) -> Vec<(String, Result<ClassificationVerdict, ParseErrorKind>)> {
        self.items
    }

    /// True when the response as a whole could not be read.
    pub fn batch_unparseable(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|(_, r)| matches!(r, Err(ParseErrorKind::UnparseableBatch)))
    }

    pub fn valid_count(&self) -> usize {
        self.items.iter().filter(|(_, r)| r.is_ok()).count()
    }
}

pub fn reconcile(request: &BatchRequest<'_>, raw: &str) -> Reconciliation {
    let entries = match parse_entries(raw) {
        Some(entries) => entries,
        None => {
            return Reconciliation {
                items: request
                    .ids()
                    .map(|id| (id.to_string(), Err(ParseErrorKind::UnparseableBatch)))
                    .collect(),
            }
        }
    };

    // first entry per id wins; unknown ids are ignored below
    let mut by_id: HashMap<String, &serde_json::Map<String, Value>> = HashMap::new();
    for entry in &entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        if let Some(id) = entry_id(obj) {
            by_id.entry(id).or_insert(obj);
        }
    }

    let items = request
        .items
        .iter()
        .map(|item| {
            // ids are compared in the same trimmed form entry_id produces
            let result = match by_id.get(item.id.trim()) {
                None => Err(ParseErrorKind::MissingResponse),
                Some(obj) => parse_verdict(obj).map(|mut criteria| {
                    for (code, v) in criteria.iter_mut() {
                        v.evidence_count = item.evidence.count(*code) as u32;
                    }
                    criteria
                }),
            }
            .and_then(|criteria| {
                ClassificationVerdict::from_complete(criteria)
                    .map_err(|_| ParseErrorKind::IncompleteVerdict)
            });
            (item.id.to_string(), result)
        })
        .collect();

    Reconciliation { items }
}

/// First JSON value in `raw` (tolerating prose and code fences around it),
/// flattened to the list of per-profile entries.
fn parse_entries(raw: &str) -> Option<Vec<Value>> {
    let text = raw.trim();
    let start = match (text.find('{'), text.find('[')) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b)?,
    };
    let value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()?;

    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut obj) => {
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = obj.remove(*key) {
                    return Some(items);
                }
            }
            // single-profile answer without a wrapper
            if entry_id(&obj).is_some() {
                return Some(vec![Value::Object(obj)]);
            }
            None
        }
        _ => None,
    }
}

fn entry_id(obj: &serde_json::Map<String, Value>) -> Option<String> {
    ID_KEYS.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_verdict(
    obj: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<CriterionCode, CriterionVerdict>, ParseErrorKind> {
    let mut criteria = BTreeMap::new();
    for code in CriterionCode::ALL {
        let value = obj
            .get(code.as_str())
            .ok_or(ParseErrorKind::IncompleteVerdict)?;
        let verdict = parse_criterion(value).ok_or(ParseErrorKind::IncompleteVerdict)?;
        criteria.insert(code, verdict);
    }
    Ok(criteria)
}

fn parse_criterion(value: &Value) -> Option<CriterionVerdict> {
    match value {
        Value::Bool(b) => Some(CriterionVerdict::asserted(*b)),
        Value::Object(obj) => {
            let asserted = ["value", "asserted"]
                .iter()
                .find_map(|k| obj.get(*k))
                .and_then(as_bool)?;
            let confidence = obj
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0));
            let justification = obj
                .get("justification")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            Some(CriterionVerdict {
                asserted,
                confidence,
                justification,
                evidence_count: 0,
            })
        }
        other => as_bool(other).map(CriterionVerdict::asserted),
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

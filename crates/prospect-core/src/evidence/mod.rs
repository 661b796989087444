//! Evidence extraction: profile text to fingerprint plus per-criterion spans.
//!
//! Pure and deterministic. Matching is case and diacritic insensitive; a
//! term matches a run of consecutive text tokens when every text token
//! starts with the stem of the corresponding term token, so `proteina`
//! also finds `proteinas` and `enzimas` finds `enzima`.

pub mod normalize;
pub mod terms;

use crate::fingerprint::{self, is_placeholder};
use crate::model::{CriterionCode, EvidenceMap, Fingerprint, ProfileRecord};
use normalize::{ceil_boundary, floor_boundary, fold, stem, tokenize, truncate_chars, Token};

/// Bytes of context kept on each side of a match.
pub const CONTEXT_WINDOW: usize = 250;
/// Upper bound on the context part of one span, in chars.
pub const CONTEXT_MAX_CHARS: usize = 500;

const FIELD_SEPARATOR: &str = " | ";

/// Folded, placeholder-free text of the fields scanned for evidence.
pub fn searchable_text(profile: &ProfileRecord) -> String {
    [
        profile.keywords.as_str(),
        profile.research_lines.as_str(),
        profile.techniques.as_str(),
    ]
    .into_iter()
    .filter(|v| !is_placeholder(v))
    .map(fold)
    .filter(|v| !v.is_empty())
    .collect::<Vec<_>>()
    .join(FIELD_SEPARATOR)
}

pub fn extract(profile: &ProfileRecord) -> (Fingerprint, EvidenceMap) {
    (fingerprint::compute(profile), evidence_map(profile))
}

pub fn evidence_map(profile: &ProfileRecord) -> EvidenceMap {
    let text = searchable_text(profile);
    let tokens = tokenize(&text);
    let mut map = EvidenceMap::empty();
    if tokens.is_empty() {
        return map;
    }
    for code in CriterionCode::ALL {
        for term in terms::terms_for(code) {
            if let Some((start, end)) = find_term(&tokens, term) {
                map.push(code, render_span(&text, term, start, end));
            }
        }
    }
    map
}

/// Byte range of the first match of `term` in the token stream.
fn find_term(tokens: &[Token<'_>], term: &str) -> Option<(usize, usize)> {
    let folded = fold(term);
    let stems: Vec<&str> = tokenize(&folded).iter().map(|t| stem(t.text)).collect();
    if stems.is_empty() || stems.len() > tokens.len() {
        return None;
    }
    tokens.windows(stems.len()).find_map(|window| {
        let hit = window
            .iter()
            .zip(&stems)
            .all(|(tok, s)| tok.text.starts_with(s));
        hit.then(|| (window[0].start, window[window.len() - 1].end))
    })
}

fn render_span(text: &str, term: &str, start: usize, end: usize) -> String {
    let from = ceil_boundary(text, start.saturating_sub(CONTEXT_WINDOW));
    let to = floor_boundary(text, end.saturating_add(CONTEXT_WINDOW));
    let context = truncate_chars(text[from..to].trim(), CONTEXT_MAX_CHARS);
    format!("[{}] {}", term, context)
}

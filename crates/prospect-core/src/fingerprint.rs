use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::model::{Fingerprint, ProfileRecord};

/// Bumped whenever canonicalization changes, invalidating every stored entry.
pub const FINGERPRINT_VERSION: &str = "prospect-fp-v1";

const PLACEHOLDERS: &[&str] = &[
    "não informado",
    "nao informado",
    "não disponível",
    "nao disponivel",
    "n/a",
    "na",
    "-",
    "none",
    "null",
];

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// True for values the scraper writes when a field was not available.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_lowercase();
    PLACEHOLDERS.iter().any(|p| *p == lower)
}

/// NFC-normalized text with whitespace runs collapsed to one space.
/// Placeholders canonicalize to the empty string.
pub fn canonical_text(value: &str) -> String {
    if is_placeholder(value) {
        return String::new();
    }
    let nfc: String = value.nfc().collect();
    nfc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Computes the content fingerprint of a profile.
///
/// Only classification-relevant text participates. The profile id does not,
/// so a renamed but otherwise identical profile maps onto the same entry.
pub fn compute(profile: &ProfileRecord) -> Fingerprint {
    let parts = [
        format!("version={}", FINGERPRINT_VERSION),
        format!("name={}", canonical_text(&profile.name)),
        format!("institution={}", canonical_text(&profile.institution)),
        format!("research_lines={}", canonical_text(&profile.research_lines)),
        format!("keywords={}", canonical_text(&profile.keywords)),
        format!("techniques={}", canonical_text(&profile.techniques)),
    ];
    Fingerprint::from_hex(sha256_hex(&parts.join("\n")))
}

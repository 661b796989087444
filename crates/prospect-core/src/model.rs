use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::FailureKind;

/// One of the six fixed classification signals.
///
/// Four positive business-fit categories and two overriding exclusions.
/// Declaration order is the canonical order used everywhere a stable
/// ordering is needed (maps, prompts, reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CriterionCode {
    /// Protein production (expression, purification, enzymes, assays).
    #[serde(rename = "PA")]
    ProteinProduction,
    /// Gene synthesis, cloning and synthetic biology.
    #[serde(rename = "S")]
    GeneSynthesis,
    /// Cell-free protein synthesis and its applications.
    #[serde(rename = "C")]
    CellFree,
    /// Growth factors: cell culture, fermentation, tissue engineering.
    #[serde(rename = "F")]
    GrowthFactors,
    /// Exclusion: no recombinant-protein usage.
    #[serde(rename = "N1")]
    NoRecombinantProtein,
    /// Exclusion: domain unrelated to biotechnology.
    #[serde(rename = "N2")]
    NonBiotech,
}

impl CriterionCode {
    pub const ALL: [CriterionCode; 6] = [
        CriterionCode::ProteinProduction,
        CriterionCode::GeneSynthesis,
        CriterionCode::CellFree,
        CriterionCode::GrowthFactors,
        CriterionCode::NoRecombinantProtein,
        CriterionCode::NonBiotech,
    ];

    pub const POSITIVE: [CriterionCode; 4] = [
        CriterionCode::ProteinProduction,
        CriterionCode::GeneSynthesis,
        CriterionCode::CellFree,
        CriterionCode::GrowthFactors,
    ];

    pub const EXCLUSIONS: [CriterionCode; 2] = [
        CriterionCode::NoRecombinantProtein,
        CriterionCode::NonBiotech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionCode::ProteinProduction => "PA",
            CriterionCode::GeneSynthesis => "S",
            CriterionCode::CellFree => "C",
            CriterionCode::GrowthFactors => "F",
            CriterionCode::NoRecombinantProtein => "N1",
            CriterionCode::NonBiotech => "N2",
        }
    }

    pub fn is_exclusion(&self) -> bool {
        matches!(
            self,
            CriterionCode::NoRecombinantProtein | CriterionCode::NonBiotech
        )
    }

    /// Short human description, used in prompts.
    pub fn description(&self) -> &'static str {
        match self {
            CriterionCode::ProteinProduction => {
                "Protein production: recombinant expression and purification, biotechnological enzymes and biocatalysis, ELISA/Western blot/biosensors, chromatography and mass spectrometry"
            }
            CriterionCode::GeneSynthesis => {
                "Gene synthesis: gene synthesis and expression, molecular cloning/PCR/CRISPR, genetic circuits and synthetic biology"
            }
            CriterionCode::CellFree => {
                "Cell-free protein synthesis (CFPS): cell-free systems, toxic or difficult proteins, drug screening, educational use, protein crystallography"
            }
            CriterionCode::GrowthFactors => {
                "Growth factors: cell culture and stem cells, fermentation and bioreactors, embryology and assisted reproduction, tissue engineering"
            }
            CriterionCode::NoRecombinantProtein => {
                "Exclusion: research area with NO direct use of recombinant proteins"
            }
            CriterionCode::NonBiotech => "Exclusion: research area NOT related to biotechnology",
        }
    }
}

impl fmt::Display for CriterionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PA" => Ok(CriterionCode::ProteinProduction),
            "S" => Ok(CriterionCode::GeneSynthesis),
            "C" => Ok(CriterionCode::CellFree),
            "F" => Ok(CriterionCode::GrowthFactors),
            "N1" => Ok(CriterionCode::NoRecombinantProtein),
            "N2" => Ok(CriterionCode::NonBiotech),
            other => Err(format!("unknown criterion code '{}'", other)),
        }
    }
}

/// One researcher's normalized input.
///
/// Field names accept both the English form and the scraper's original
/// names. Text fields accept a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default, alias = "nome_completo", deserialize_with = "text_or_list")]
    pub name: String,
    #[serde(
        default,
        alias = "instituicao_vinculo",
        deserialize_with = "text_or_list"
    )]
    pub institution: String,
    #[serde(default, alias = "linhas_pesquisa", deserialize_with = "text_or_list")]
    pub research_lines: String,
    #[serde(default, alias = "palavras_chave", deserialize_with = "text_or_list")]
    pub keywords: String,
    #[serde(
        default,
        alias = "tecnicas_utilizadas",
        deserialize_with = "text_or_list"
    )]
    pub techniques: String,
}

impl ProfileRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            institution: String::new(),
            research_lines: String::new(),
            keywords: String::new(),
            techniques: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = institution.into();
        self
    }

    pub fn with_research_lines(mut self, lines: impl Into<String>) -> Self {
        self.research_lines = lines.into();
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_techniques(mut self, techniques: impl Into<String>) -> Self {
        self.techniques = techniques.into();
        self
    }
}

fn text_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrList {
        Text(String),
        List(Vec<String>),
        Null(()),
    }

    Ok(match TextOrList::deserialize(deserializer)? {
        TextOrList::Text(s) => s,
        TextOrList::List(items) => items.join("; "),
        TextOrList::Null(()) => String::new(),
    })
}

/// Content digest identifying a profile's classification-relevant text.
///
/// The only legitimate key into the classification cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Matched evidence spans per criterion. Always holds all six codes;
/// an empty list means no evidence was found for that criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceMap(BTreeMap<CriterionCode, Vec<String>>);

impl EvidenceMap {
    pub fn empty() -> Self {
        Self(CriterionCode::ALL.iter().map(|c| (*c, Vec::new())).collect())
    }

    pub fn push(&mut self, code: CriterionCode, span: String) {
        self.0.entry(code).or_default().push(span);
    }

    pub fn spans(&self, code: CriterionCode) -> &[String] {
        self.0.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, code: CriterionCode) -> usize {
        self.spans(code).len()
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CriterionCode, &[String])> {
        self.0.iter().map(|(c, v)| (*c, v.as_slice()))
    }
}

impl Default for EvidenceMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome for one criterion of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionVerdict {
    pub asserted: bool,
    /// Model confidence in `[0, 1]`, when the classifier supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub justification: String,
    /// Number of locally matched evidence spans that backed the request.
    #[serde(default)]
    pub evidence_count: u32,
}

impl CriterionVerdict {
    pub fn asserted(asserted: bool) -> Self {
        Self {
            asserted,
            confidence: None,
            justification: String::new(),
            evidence_count: 0,
        }
    }
}

/// Complete per-criterion verdict set for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<CriterionCode, CriterionVerdict>",
    into = "BTreeMap<CriterionCode, CriterionVerdict>"
)]
pub struct ClassificationVerdict(BTreeMap<CriterionCode, CriterionVerdict>);

impl TryFrom<BTreeMap<CriterionCode, CriterionVerdict>> for ClassificationVerdict {
    type Error = String;

    fn try_from(criteria: BTreeMap<CriterionCode, CriterionVerdict>) -> Result<Self, Self::Error> {
        Self::from_complete(criteria).map_err(|code| format!("verdict set is missing {}", code))
    }
}

impl From<ClassificationVerdict> for BTreeMap<CriterionCode, CriterionVerdict> {
    fn from(v: ClassificationVerdict) -> Self {
        v.0
    }
}

impl ClassificationVerdict {
    /// Builds a verdict set, or returns the first missing code.
    pub fn from_complete(
        criteria: BTreeMap<CriterionCode, CriterionVerdict>,
    ) -> Result<Self, CriterionCode> {
        for code in CriterionCode::ALL {
            if !criteria.contains_key(&code) {
                return Err(code);
            }
        }
        Ok(Self(criteria))
    }

    pub fn get(&self, code: CriterionCode) -> Option<&CriterionVerdict> {
        self.0.get(&code)
    }

    pub fn is_asserted(&self, code: CriterionCode) -> bool {
        self.get(code).map(|v| v.asserted).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CriterionCode, &CriterionVerdict)> {
        self.0.iter().map(|(c, v)| (*c, v))
    }
}

/// Final label derived from category scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalLabel {
    Strategic,
    Priority,
    Regular,
    LowPriority,
    Excluded,
}

impl FinalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalLabel::Strategic => "strategic",
            FinalLabel::Priority => "priority",
            FinalLabel::Regular => "regular",
            FinalLabel::LowPriority => "low_priority",
            FinalLabel::Excluded => "excluded",
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, FinalLabel::Excluded)
    }
}

impl fmt::Display for FinalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinalLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strategic" => Ok(FinalLabel::Strategic),
            "priority" => Ok(FinalLabel::Priority),
            "regular" => Ok(FinalLabel::Regular),
            "low_priority" => Ok(FinalLabel::LowPriority),
            "excluded" => Ok(FinalLabel::Excluded),
            other => Err(format!("unknown final label '{}'", other)),
        }
    }
}

/// Stored result of the first successful classification of a fingerprint.
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub fingerprint: Fingerprint,
    pub verdicts: ClassificationVerdict,
    pub category_scores: BTreeMap<CriterionCode, f64>,
    pub final_label: FinalLabel,
    pub computed_at: DateTime<Utc>,
}

impl CachedResult {
    pub fn category_score(&self, code: CriterionCode) -> f64 {
        self.category_scores.get(&code).copied().unwrap_or(0.0)
    }
}

/// Where a successful result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Live,
}

/// Caller-visible result for one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    Success {
        profile_id: String,
        source: ResultSource,
        result: CachedResult,
    },
    Failed {
        profile_id: String,
        fingerprint: Fingerprint,
        kind: FailureKind,
        message: String,
    },
}

impl ClassificationOutcome {
    pub fn profile_id(&self) -> &str {
        match self {
            ClassificationOutcome::Success { profile_id, .. }
            | ClassificationOutcome::Failed { profile_id, .. } => profile_id,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            ClassificationOutcome::Success { result, .. } => &result.fingerprint,
            ClassificationOutcome::Failed { fingerprint, .. } => fingerprint,
        }
    }

    pub fn result(&self) -> Option<&CachedResult> {
        match self {
            ClassificationOutcome::Success { result, .. } => Some(result),
            ClassificationOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ClassificationOutcome::Success { .. } => None,
            ClassificationOutcome::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ClassificationOutcome::Success { .. })
    }

    /// Same outcome, reported under another profile id (duplicate content).
    pub(crate) fn for_profile(&self, id: &str) -> Self {
        let mut out = self.clone();
        match &mut out {
            ClassificationOutcome::Success { profile_id, .. }
            | ClassificationOutcome::Failed { profile_id, .. } => *profile_id = id.to_string(),
        }
        out
    }
}

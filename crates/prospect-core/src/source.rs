//! Profile sources: finite, replayable sequences of [`ProfileRecord`].

use std::path::{Path, PathBuf};

use crate::errors::SourceError;
use crate::model::ProfileRecord;

pub trait ProfileSource {
    /// Reads the full sequence. Calling it again yields the same records.
    fn profiles(&self) -> Result<Vec<ProfileRecord>, SourceError>;
}

/// One JSON object per line; blank lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn parse_json_lines(raw: &str) -> Result<Vec<ProfileRecord>, SourceError> {
    let mut out = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let profile: ProfileRecord =
            serde_json::from_str(line).map_err(|e| SourceError::Parse {
                line: index + 1,
                message: e.to_string(),
            })?;
        out.push(profile);
    }
    Ok(out)
}

impl ProfileSource for JsonLinesSource {
    fn profiles(&self) -> Result<Vec<ProfileRecord>, SourceError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| SourceError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;
        parse_json_lines(&raw)
    }
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    profiles: Vec<ProfileRecord>,
}

impl VecSource {
    pub fn new(profiles: Vec<ProfileRecord>) -> Self {
        Self { profiles }
    }
}

impl ProfileSource for VecSource {
    fn profiles(&self) -> Result<Vec<ProfileRecord>, SourceError> {
        Ok(self.profiles.clone())
    }
}

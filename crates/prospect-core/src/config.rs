use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::scoring::ScoringPolicy;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Largest batch the prompt layout is tuned for.
pub const MAX_BATCH_SIZE: usize = 50;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub version: u32,
    /// SQLite file holding the classification cache.
    pub cache_path: PathBuf,
    /// Bypass cache lookups and overwrite stored results.
    pub refresh: bool,
    pub classifier: ClassifierConfig,
    pub batch: BatchConfig,
    pub scoring: ScoringPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            cache_path: PathBuf::from(".prospect/cache.db"),
            refresh: false,
            classifier: ClassifierConfig::default(),
            batch: BatchConfig::default(),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        self.batch.validate()?;
        self.classifier.validate()?;
        self.scoring.validate()?;
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    /// Offline deterministic classifier, for dry runs.
    Fake,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
        }
    }
}

impl ClassifierConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError("classifier.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError(format!(
                "classifier.temperature must be within [0, 2] (got {})",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError(
                "classifier.max_output_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Total attempts per batch, first call included.
    pub max_batch_attempts: u32,
    /// Total individual attempts for a member whose verdict was invalid.
    /// May not exceed `max_batch_attempts`.
    pub max_item_attempts: u32,
    pub call_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_batch_attempts: 3,
            max_item_attempts: 2,
            call_timeout_ms: 120_000,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            inter_batch_delay_ms: 0,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError(format!(
                "batch.batch_size must be within 1..={} (got {})",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.max_batch_attempts == 0 || self.max_item_attempts == 0 {
            return Err(ConfigError(
                "batch attempt ceilings must be at least 1".into(),
            ));
        }
        if self.max_item_attempts > self.max_batch_attempts {
            return Err(ConfigError(format!(
                "batch.max_item_attempts ({}) exceeds max_batch_attempts ({})",
                self.max_item_attempts, self.max_batch_attempts
            )));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError("batch.call_timeout_ms must be positive".into()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError(format!(
                "batch.backoff_max_ms ({}) is below backoff_base_ms ({})",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<EngineConfig, ConfigError> {
    let cfg: EngineConfig = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

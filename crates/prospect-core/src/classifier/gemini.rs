use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{BatchRequest, Classifier, ClassifierError};
use crate::config::ClassifierConfig;
use crate::errors::ConfigError;

/// Google Gemini `generateContent` adapter.
pub struct GeminiClassifier {
    pub model: String,
    pub base_url: String,
    api_key: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiClassifier {
    pub fn new(
        model: String,
        base_url: String,
        api_key: String,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
            max_output_tokens,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self, ConfigError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            ConfigError(format!(
                "environment variable {} is not set (needed for the gemini classifier)",
                cfg.api_key_env
            ))
        })?;
        Ok(Self::new(
            cfg.model.clone(),
            cfg.base_url.clone(),
            api_key,
            cfg.temperature,
            cfg.max_output_tokens,
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, request: &BatchRequest<'_>) -> Result<String, ClassifierError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt() }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "responseMimeType": "application/json",
            }
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            200..=299 => {}
            429 => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Err(ClassifierError::Retryable {
                    message: "rate limited (HTTP 429)".into(),
                    retry_after,
                });
            }
            408 | 500..=599 => {
                let text = resp.text().await.unwrap_or_default();
                return Err(ClassifierError::retryable(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    text
                )));
            }
            _ => {
                let text = resp.text().await.unwrap_or_default();
                return Err(ClassifierError::terminal(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    text
                )));
            }
        }

        let payload: serde_json::Value = resp.json().await?;
        // Parse candidates[0].content.parts[0].text
        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                let reason = payload
                    .pointer("/candidates/0/finishReason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("no candidates");
                ClassifierError::retryable(format!("response has no text ({})", reason))
            })?;

        debug!(
            batch = %request.batch_id,
            model = %self.model,
            bytes = text.len(),
            "gemini response received"
        );
        Ok(text.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date. A date in the
/// past means no wait.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_accepts_delta_seconds() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_accepts_http_date() {
        let at = Utc::now() + chrono::Duration::seconds(120);
        let header = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let wait = parse_retry_after(&header).unwrap();
        assert!(wait <= Duration::from_secs(120));
        assert!(wait >= Duration::from_secs(100));

        let past = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(past, Some(Duration::ZERO));
    }

    #[test]
    fn unreadable_retry_after_is_ignored() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-5"), None);
    }
}

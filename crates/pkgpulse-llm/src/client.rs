//! Client for an Ollama-style local generation endpoint.

use crate::error::{LlmError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_URL: &str = "http://localhost:11434";

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap();
    static ref BARE_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    /// Primary model for complex analysis.
    pub model: String,
    /// Faster model for simpler prompts.
    pub fast_model: String,
}

impl LlmClient {
    pub fn new(model: impl Into<String>, fast_model: impl Into<String>) -> Self {
        let base_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        Self::with_base_url(base_url, model, fast_model)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        model: impl Into<String>,
        fast_model: impl Into<String>,
    ) -> Self {
        // Generation can be slow on large local models.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            fast_model: fast_model.into(),
        }
    }

    /// Generate a completion. Low temperature keeps repeated assessments of
    /// identical inputs approximately deterministic.
    pub async fn generate(&self, prompt: &str, fast: bool) -> Result<String> {
        let model = if fast { &self.fast_model } else { &self.model };
        let payload = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": 0.1},
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LlmError::Status(response.status().as_u16()));
        }
        let body: Value = response.json().await?;
        Ok(body
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Whether the endpoint is up and serves one of the configured models.
    pub async fn is_available(&self) -> bool {
        let Ok(response) = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        let Ok(body) = response.json::<Value>().await else {
            return false;
        };
        body.get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .any(|name| name.contains(&self.model) || name.contains(&self.fast_model))
            })
            .unwrap_or(false)
    }
}

/// Extract a JSON object from model output: prefer a fenced ```json block,
/// else the first `{...}` span, else fail the assessment.
pub fn extract_json(text: &str) -> Result<Value> {
    let candidate = if let Some(caps) = FENCED_JSON.captures(text) {
        caps.get(1).map(|m| m.as_str().to_string())
    } else {
        BARE_OBJECT.find(text).map(|m| m.as_str().to_string())
    };
    let Some(candidate) = candidate else {
        debug!("no JSON found in model output");
        return Err(LlmError::NoJson);
    };
    serde_json::from_str(&candidate).map_err(|e| {
        debug!("model output was not valid JSON: {e}");
        LlmError::NoJson
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let text = "Here is my assessment:\n```json\n{\"clarity\": 8}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["clarity"], 8);
    }

    #[test]
    fn extracts_bare_object_span() {
        let text = "The result is {\"overall\": 6, \"summary\": \"fine\"} as requested.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["overall"], 6);
    }

    #[test]
    fn fenced_block_wins_over_bare_span() {
        let text = "{\"wrong\": 1}\n```json\n{\"right\": 2}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["right"], 2);
    }

    #[test]
    fn garbage_fails_the_assessment() {
        assert!(extract_json("no json here at all").is_err());
        assert!(extract_json("almost { but not ] valid }").is_err());
    }
}

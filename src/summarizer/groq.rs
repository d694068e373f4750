use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{non_empty, prompt_for, Summarizer, SummaryType};
use crate::config::SummarizerConfig;
use crate::error::{Result, SpeakerError};

/// Hosted inference through Groq's OpenAI-compatible chat API.
pub struct GroqSummarizer {
    api_key: Option<String>,
    base_url: String,
    model_small: String,
    model_large: String,
    client: Client,
}

impl GroqSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SpeakerError::Config(format!("Failed to create HTTP client: {e}")))?;
        let api_key = config
            .groq_api_key
            .clone()
            .or_else(|| std::env::var("GROQ_API_KEY").ok())
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            api_key,
            base_url: config.groq_url.trim_end_matches('/').to_string(),
            model_small: config.groq_model_small.clone(),
            model_large: config.groq_model_large.clone(),
            client,
        })
    }

    fn model_for(&self, summary_type: SummaryType) -> &str {
        match summary_type {
            SummaryType::LongResponse => &self.model_large,
            _ => &self.model_small,
        }
    }
}

#[async_trait]
impl Summarizer for GroqSummarizer {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, text: &str, summary_type: SummaryType) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Err(SpeakerError::Summarizer("API key not configured".into()));
        };
        let params = prompt_for(summary_type);
        let body = json!({
            "model": self.model_for(summary_type),
            "messages": [
                { "role": "system", "content": params.system },
                { "role": "user", "content": text }
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeakerError::Summarizer(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(SpeakerError::Summarizer(format!("returned status {}", resp.status())));
        }
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SpeakerError::Summarizer(format!("unreadable response: {e}")))?;
        if let Some(error) = data.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(SpeakerError::Summarizer(format!("API error: {message}")));
        }
        non_empty(data.pointer("/choices/0/message/content").and_then(Value::as_str), self.name())
    }

    async fn health_check(&self) -> bool {
        let Some(api_key) = &self.api_key else {
            return false;
        };
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }
}

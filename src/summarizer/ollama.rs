use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{non_empty, prompt_for, Summarizer, SummaryType};
use crate::config::SummarizerConfig;
use crate::error::{Result, SpeakerError};

/// Local LLM inference through Ollama's `/api/generate`.
pub struct OllamaSummarizer {
    model: String,
    model_large: String,
    host: String,
    client: Client,
}

impl OllamaSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpeakerError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            model_large: config.model_large.clone(),
            host: config.host.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn model_for(&self, summary_type: SummaryType) -> &str {
        match summary_type {
            SummaryType::LongResponse => &self.model_large,
            _ => &self.model,
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, text: &str, summary_type: SummaryType) -> Result<String> {
        let params = prompt_for(summary_type);
        let body = json!({
            "model": self.model_for(summary_type),
            "system": params.system,
            "prompt": text,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens
            }
        });

        let url = format!("{}/api/generate", self.host);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeakerError::Summarizer(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(SpeakerError::Summarizer(format!("returned status {}", resp.status())));
        }
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SpeakerError::Summarizer(format!("unreadable response: {e}")))?;
        non_empty(data["response"].as_str(), self.name())
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|resp| resp.status().is_success())
    }
}

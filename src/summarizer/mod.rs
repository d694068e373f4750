//! Text summarization for speech.
//!
//! Assistant output is rewritten for the ear before it is queued: short
//! replies are cleaned of markdown, long ones condensed to a first-person
//! summary, permission prompts turned into a one-line announcement.
//! Backends: Ollama (local) and Groq (hosted). If the backend is
//! unavailable the text degrades to a local fallback.

mod groq;
mod ollama;
mod prompts;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SummarizerConfig;
use crate::error::{Result, SpeakerError};
use crate::scheduler::MessageKind;

pub use groq::GroqSummarizer;
pub use ollama::OllamaSummarizer;
pub use prompts::{prompt_for, PromptParams};

const MAX_INPUT_CHARS: usize = 2000;

/// Below this length a reply without code is only cleaned, not condensed.
const SHORT_RESPONSE_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    ShortResponse,
    LongResponse,
    PermissionRequest,
}

impl SummaryType {
    pub fn classify(kind: MessageKind, text: &str) -> Self {
        if kind == MessageKind::Permission {
            Self::PermissionRequest
        } else if text.chars().count() < SHORT_RESPONSE_CHARS && !text.contains("```") {
            Self::ShortResponse
        } else {
            Self::LongResponse
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// One round trip to the model, no fallback.
    async fn complete(&self, text: &str, summary_type: SummaryType) -> Result<String>;

    /// Backend reachable and configured.
    async fn health_check(&self) -> bool;

    /// Returns the text to speak and how long it took (ms). Never fails:
    /// backend errors degrade to [`fallback`].
    async fn summarize(&self, text: &str, summary_type: SummaryType) -> (String, f64) {
        let t_start = Instant::now();
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let result = self.complete(&input, summary_type).await;
        let latency_ms = t_start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(summary) => {
                info!(
                    "Summarized {} chars → {} chars ({:?}, {}, {latency_ms:.0}ms)",
                    text.chars().count(),
                    summary.chars().count(),
                    summary_type,
                    self.name()
                );
                (summary, latency_ms)
            }
            Err(e) => {
                warn!("{} {e}", self.name());
                (fallback(text, summary_type), latency_ms)
            }
        }
    }
}

/// Build the configured backend.
pub fn from_config(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaSummarizer::new(config)?)),
        "groq" => Ok(Arc::new(GroqSummarizer::new(config)?)),
        other => Err(SpeakerError::Config(format!(
            "Unknown summarizer.backend '{other}' (expected ollama or groq)"
        ))),
    }
}

/// Local stand-in when no model answered: long text keeps its first two
/// sentences, anything else is spoken as written.
pub fn fallback(text: &str, summary_type: SummaryType) -> String {
    match summary_type {
        SummaryType::LongResponse => first_sentences(text, 2),
        SummaryType::ShortResponse | SummaryType::PermissionRequest => text.trim().to_string(),
    }
}

/// The first `n` sentences.
pub fn first_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            count += 1;
            if count >= n {
                return text[..i + c.len_utf8()].to_string();
            }
        }
    }
    text.to_string()
}

/// Model output with surrounding whitespace removed; blank is an error.
fn non_empty(text: Option<&str>, backend: &str) -> Result<String> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(SpeakerError::Summarizer(format!("{backend} returned empty response"))),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use axum::Router;

    pub async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    #[async_trait]
    impl Summarizer for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        async fn complete(&self, _text: &str, _summary_type: SummaryType) -> Result<String> {
            Err(SpeakerError::Summarizer("connection refused".into()))
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    #[test]
    fn fallback_keeps_two_sentences() {
        assert_eq!(
            first_sentences("  Fixed the bug. Added tests! Updated docs? Done.", 2),
            "Fixed the bug. Added tests!"
        );
        assert_eq!(first_sentences("No punctuation here", 2), "No punctuation here");
        assert_eq!(first_sentences("Ünïcode first. Then more.", 1), "Ünïcode first.");
    }

    #[test]
    fn classifies_by_kind_length_and_code() {
        assert_eq!(
            SummaryType::classify(MessageKind::Summary, "Done. All tests pass."),
            SummaryType::ShortResponse
        );
        assert_eq!(
            SummaryType::classify(MessageKind::Summary, "Run ```cargo fmt``` first."),
            SummaryType::LongResponse
        );
        assert_eq!(
            SummaryType::classify(MessageKind::Summary, &"word ".repeat(80)),
            SummaryType::LongResponse
        );
        assert_eq!(
            SummaryType::classify(MessageKind::Permission, "Tool: Bash"),
            SummaryType::PermissionRequest
        );
    }

    #[tokio::test]
    async fn failed_backend_falls_back_per_type() {
        let long = "First. Second. Third.";
        let (text, _) = Unavailable.summarize(long, SummaryType::LongResponse).await;
        assert_eq!(text, "First. Second.");

        let (text, _) = Unavailable.summarize("  One. Two. Three. ", SummaryType::ShortResponse).await;
        assert_eq!(text, "One. Two. Three.");

        let (text, _) = Unavailable
            .summarize("Claude needs permission to use Bash.", SummaryType::PermissionRequest)
            .await;
        assert_eq!(text, "Claude needs permission to use Bash.");
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let config = SummarizerConfig {
            backend: "openai".into(),
            ..SummarizerConfig::default()
        };
        assert!(matches!(from_config(&config), Err(SpeakerError::Config(_))));
        assert_eq!(from_config(&SummarizerConfig::default()).unwrap().name(), "ollama");
    }

    #[test]
    fn summary_type_serializes_snake_case() {
        let t: SummaryType = serde_json::from_str("\"permission_request\"").unwrap();
        assert_eq!(t, SummaryType::PermissionRequest);
    }
}

//! Speech synthesis capability and its backends.
//!
//! The scheduler only ever sees `SpeechSynthesizer`; which engine sits
//! behind it is decided at startup from `tts.backend`.

use async_trait::async_trait;

use crate::audio::Waveform;
use crate::error::Result;

pub mod kokoro;
pub mod pipeline;
pub mod remote;

pub use kokoro::KokoroEngine;
pub use pipeline::GenerationPipeline;
pub use remote::RemoteEngine;

/// Turns text into a playable waveform.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Backend name for logs and `/status`.
    fn name(&self) -> &str;

    async fn synthesize_speech(&self, text: &str) -> Result<Waveform>;

    fn current_voice(&self) -> Option<String> {
        None
    }

    /// Switch voice; returns false if the backend doesn't know it (or has no voices).
    fn set_voice(&self, _voice: &str) -> bool {
        false
    }

    fn list_voices(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Split text into sentences at .!? boundaries followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let end = i + 1;
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    // Remainder
    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("Build finished. Tests pass! Deploy now?  Done"),
            vec!["Build finished.", "Tests pass!", "Deploy now?", "Done"]
        );
    }

    #[test]
    fn keeps_decimals_and_paths_together() {
        assert_eq!(
            split_sentences("Version 1.2 ships in src/main.rs today."),
            vec!["Version 1.2 ships in src/main.rs today."]
        );
    }

    #[test]
    fn blank_text_has_no_sentences() {
        assert!(split_sentences("   ").is_empty());
    }
}
